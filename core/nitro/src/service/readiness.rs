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

//! Readiness: the `notification-fd` file and the pipe a service reports on
use crate::service::ServiceManager;
use event::{EventType, Events, Source};
use std::fs;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::rc::Weak;

/// How a start is resolved to UP
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// assume ready after the grace period
    Default,
    /// any byte written to this child descriptor
    Pipe(RawFd),
    /// only an explicit `ready` call
    Explicit,
}

/// Read `notification-fd` from a service directory. The content must be a
/// number followed by a newline, anything else means the default.
pub(crate) fn parse_notification_fd(dir: &Path) -> Readiness {
    let content = match fs::read_to_string(dir.join("notification-fd")) {
        Ok(c) => c,
        Err(_) => return Readiness::Default,
    };
    let number = match content.strip_suffix('\n') {
        Some(n) => n,
        None => {
            log::warn!("{:?}/notification-fd is not newline terminated", dir);
            return Readiness::Default;
        }
    };
    match number.parse::<RawFd>() {
        Ok(0) => Readiness::Explicit,
        Ok(fd) if fd > 0 => Readiness::Pipe(fd),
        _ => {
            log::warn!("{:?}/notification-fd is malformed: {:?}", dir, number);
            Readiness::Default
        }
    }
}

/// Read end of a readiness pipe, watched until the first byte or EOF
pub(crate) struct ReadyPipe {
    name: String,
    fd: RawFd,
    manager: Weak<ServiceManager>,
}

impl ReadyPipe {
    pub(crate) fn new(name: &str, fd: RawFd, manager: Weak<ServiceManager>) -> Self {
        ReadyPipe {
            name: name.to_string(),
            fd,
            manager,
        }
    }
}

impl Drop for ReadyPipe {
    fn drop(&mut self) {
        basic::fd::close(self.fd);
    }
}

impl Source for ReadyPipe {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn event_type(&self) -> EventType {
        EventType::Io
    }

    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN | libc::EPOLLHUP) as u32
    }

    fn priority(&self) -> i8 {
        0i8
    }

    fn dispatch(&self, _e: &Events) -> i32 {
        let mut buf = [0u8; 64];
        let ready = match nix::unistd::read(self.fd, &mut buf) {
            Ok(0) => false,
            Ok(_) => true,
            Err(nix::Error::EAGAIN) | Err(nix::Error::EINTR) => return 0,
            Err(e) => {
                log::warn!("failed to read readiness pipe of {}: {}", self.name, e);
                false
            }
        };
        if let Some(manager) = self.manager.upgrade() {
            manager.ready_notified(&self.name, self.fd, ready);
        }
        0
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }

    fn description(&self) -> String {
        format!("readiness pipe of {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_content(content: &str) -> Readiness {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notification-fd"), content).unwrap();
        parse_notification_fd(dir.path())
    }

    #[test]
    fn test_parse_notification_fd() {
        assert_eq!(with_content("3\n"), Readiness::Pipe(3));
        assert_eq!(with_content("0\n"), Readiness::Explicit);
        assert_eq!(with_content("3"), Readiness::Default);
        assert_eq!(with_content("three\n"), Readiness::Default);
        assert_eq!(with_content("-1\n"), Readiness::Default);

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(parse_notification_fd(dir.path()), Readiness::Default);
    }
}
