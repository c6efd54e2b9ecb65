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

//! The per-service record kept in the registry
use super::name::Kind;
use super::readiness::{ReadyPipe, Readiness};
use nix::unistd::Pid;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Lifecycle states, the discriminant is the byte sent to event listeners
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceState {
    Down = 1,
    Setup = 2,
    Starting = 3,
    Up = 4,
    Oneshot = 5,
    Shutdown = 6,
    Restart = 7,
    Fatal = 8,
    Delay = 9,
}

impl ServiceState {
    /// counts as running for start, wait-up and check
    pub fn is_up(&self) -> bool {
        matches!(self, ServiceState::Up | ServiceState::Oneshot)
    }

    /// the record may be dropped or restarted without touching a process
    pub fn is_settled(&self) -> bool {
        matches!(self, ServiceState::Down | ServiceState::Fatal)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_uppercase())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Wanted {
    Up,
    Down,
}

/// How the last script of the service ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExitStatus {
    None,
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    /// `<code> <signal>` as handed to finish scripts
    pub(crate) fn finish_args(&self) -> (String, String) {
        match self {
            ExitStatus::Exited(code) => (code.to_string(), "0".to_string()),
            ExitStatus::Signaled(sig) => ("-1".to_string(), sig.to_string()),
            ExitStatus::None => ("0".to_string(), "0".to_string()),
        }
    }

    /// wait(2) style status word
    pub(crate) fn wstatus(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => (code & 0xff) << 8,
            ExitStatus::Signaled(sig) => sig & 0x7f,
            ExitStatus::None => 0,
        }
    }
}

/// Which script runs besides (or instead of) the run process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Script {
    Setup,
    Finish,
}

impl Script {
    pub(crate) fn file(&self) -> &'static str {
        match self {
            Script::Setup => "setup",
            Script::Finish => "finish",
        }
    }
}

/// What happens when a service deadline passes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Deadline {
    /// readiness grace period
    Ready,
    /// re-run a failed setup
    SetupRetry,
    /// leave DELAY
    Delay,
    /// escalate to SIGKILL
    Kill,
}

pub(crate) struct Service {
    pub(crate) name: String,
    /// where the scripts are read from and the working directory of children
    pub(crate) path: PathBuf,
    pub(crate) kind: Kind,
    pub(crate) wanted: Wanted,
    pub(crate) state: ServiceState,
    /// the run process
    pub(crate) pid: Option<Pid>,
    /// a setup or finish script in flight
    pub(crate) helper: Option<(Pid, Script)>,
    pub(crate) last_exit: ExitStatus,
    pub(crate) log_target: Option<String>,
    pub(crate) readiness: Readiness,
    pub(crate) anchored: bool,
    pub(crate) reaps: u64,
    pub(crate) changed: Instant,
    /// spawn time of the current run process
    pub(crate) spawned: Option<Instant>,
    pub(crate) deadline: Option<(Instant, Deadline)>,
    /// the pending restart skips DELAY
    pub(crate) fast: bool,
    pub(crate) ready_pipe: Option<Rc<ReadyPipe>>,
}

impl Service {
    pub(crate) fn new(name: &str, path: PathBuf, kind: Kind, wanted: Wanted) -> Self {
        Service {
            name: name.to_string(),
            path,
            kind,
            wanted,
            state: ServiceState::Down,
            pid: None,
            helper: None,
            last_exit: ExitStatus::None,
            log_target: None,
            readiness: Readiness::Default,
            anchored: true,
            reaps: 0,
            changed: Instant::now(),
            spawned: None,
            deadline: None,
            fast: false,
            ready_pipe: None,
        }
    }

    /// no process of the service exists and nothing is scheduled
    pub(crate) fn is_idle(&self) -> bool {
        self.state.is_settled() && self.pid.is_none() && self.helper.is_none()
    }

    pub(crate) fn has_script(&self, file: &str) -> bool {
        self.path.join(file).is_file()
    }

    pub(crate) fn uptime(&self) -> Duration {
        self.changed.elapsed()
    }

    /// `STATE name (pid N) (wstatus W) Us`
    pub(crate) fn list_line(&self) -> String {
        let mut line = format!("{} {}", self.state, self.name);
        if let Some(pid) = self.pid {
            line += &format!(" (pid {})", pid);
        }
        line += &format!(
            " (wstatus {}) {}s",
            self.last_exit.wstatus(),
            self.uptime().as_secs()
        );
        line
    }
}
