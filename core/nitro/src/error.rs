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

//! Error define
use cmdproto::proto::execute::{ErrorCode, EXIT_FAILURE};
use constants::EXIT_FATAL;
use snafu::prelude::*;
#[allow(unused_imports)]
pub use snafu::ResultExt;

/// nitro Error
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Io: {}", source))]
    Io { source: std::io::Error },

    #[snafu(display("Errno: {}", source))]
    Nix { source: nix::Error },

    #[snafu(display("Event: {}", source))]
    Event { source: event::Error },

    #[snafu(display("Cmdproto: {}", source))]
    Cmdproto { source: cmdproto::Error },

    #[snafu(display("Basic: {}", source))]
    Basic { source: basic::Error },

    #[snafu(display("no such service: {}", name))]
    UnknownService { name: String },

    #[snafu(display("invalid service name: {}", name))]
    InvalidName { name: String },

    #[snafu(display("{}: {}", name, msg))]
    Refused { name: String, msg: String },

    #[snafu(display("failed to spawn {}: {}", path, source))]
    Spawn { path: String, source: nix::Error },

    #[snafu(display("{}", msg))]
    Other { msg: String },
}

impl ErrorCode for Error {
    fn error_code(&self) -> u32 {
        match self {
            Error::UnknownService { .. } | Error::InvalidName { .. } => EXIT_FATAL as u32,
            _ => EXIT_FAILURE,
        }
    }
}

/// new Result
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let e = Error::UnknownService {
            name: "sv".to_string(),
        };
        assert_eq!(e.error_code(), 111);
        assert_eq!(e.to_string(), "no such service: sv");
        let e = Error::Refused {
            name: "SYS".to_string(),
            msg: "cannot be started".to_string(),
        };
        assert_eq!(e.error_code(), 1);
    }
}
