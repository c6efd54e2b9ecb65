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


//! signal dispositions of spawned children
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

/// reset all signal handlers
pub fn reset_all_signal_handlers() {
    for sig in nix::sys::signal::Signal::iterator() {
        /* SIGKILL and SIGSTOP is invalid, see sigaction(2) */
        if sig == Signal::SIGKILL || sig == Signal::SIGSTOP {
            continue;
        }
        let sig_action = SigAction::new(SigHandler::SigDfl, SaFlags::SA_RESTART, SigSet::empty());
        unsafe {
            if let Err(e) = signal::sigaction(sig, &sig_action) {
                log::warn!("Failed to reset signal {}: {}", sig, e);
            }
        }
    }
}

/// reset signal mask
pub fn reset_signal_mask() {
    if let Err(e) = signal::sigprocmask(
        signal::SigmaskHow::SIG_SETMASK,
        Some(&SigSet::empty()),
        None,
    ) {
        log::warn!("reset sigprocmask failed:{}", e);
    }
}

/// parse a signal given by number or by name, with or without the SIG prefix
pub fn parse_signal(s: &str) -> Option<Signal> {
    if let Ok(n) = s.parse::<i32>() {
        return Signal::try_from(n).ok();
    }
    let upper = s.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    name.parse::<Signal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal("15"), Some(Signal::SIGTERM));
        assert_eq!(parse_signal("hup"), Some(Signal::SIGHUP));
        assert_eq!(parse_signal("SIGUSR1"), Some(Signal::SIGUSR1));
        assert_eq!(parse_signal("nope"), None);
        assert_eq!(parse_signal("0"), None);
    }
}
