// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Provide commands that nitroctl can call
#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod abi;
pub mod execute;
pub mod frame;

pub use abi::command_request::Action;
pub use abi::*;
pub use frame::ProstClientStream;
pub use frame::ProstServerStream;
use std::fmt;

impl CommandRequest {
    /// Create a new command request applying to some services
    pub fn new_service(action: Action, names: Vec<String>) -> Self {
        Self {
            action: action.into(),
            names,
            signal: 0,
        }
    }

    /// Create a new command request delivering a signal
    pub fn new_signal(signal: i32, names: Vec<String>) -> Self {
        Self {
            action: Action::Signal.into(),
            names,
            signal,
        }
    }

    /// Create a new command request for the daemon itself
    pub fn new_global(action: Action) -> Self {
        Self::new_service(action, Vec::new())
    }
}

impl CommandResponse {
    /// A successful response
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            error_code: 0,
            message: message.into(),
        }
    }

    /// A failed response
    pub fn failed(error_code: u32, message: impl Into<String>) -> Self {
        Self {
            error_code,
            message: message.into(),
        }
    }
}

impl Action {
    /// Whether the action refers to services by name
    pub fn takes_names(&self) -> bool {
        !matches!(
            self,
            Action::List | Action::Rescan | Action::Info | Action::Shutdown | Action::Reboot
        )
    }

    /// Whether naming a service creates its record when it is not known yet
    pub fn creates_service(&self) -> bool {
        matches!(
            self,
            Action::Up | Action::Start | Action::Restart | Action::FastRestart
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::FastRestart => "fast-restart",
            Action::WaitUp => "wait-up",
            Action::WaitDown => "wait-down",
            _ => return write!(f, "{}", format!("{:?}", self).to_lowercase()),
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Restart.to_string(), "restart");
        assert_eq!(Action::FastRestart.to_string(), "fast-restart");
        assert_eq!(Action::WaitDown.to_string(), "wait-down");
    }

    #[test]
    fn test_request_action() {
        let req = CommandRequest::new_signal(10, vec!["a".to_string()]);
        assert_eq!(req.action(), Action::Signal);
        assert_eq!(req.signal, 10);
        assert!(req.action().takes_names());
        assert!(!CommandRequest::new_global(Action::Rescan).action().takes_names());
        assert!(Action::Start.creates_service());
        assert!(!Action::Stop.creates_service());
    }
}
