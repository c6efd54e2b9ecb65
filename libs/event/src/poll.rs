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

//! Thin wrapper over an epoll instance
use crate::error::*;
use nix::errno::Errno;
use nix::sys::epoll::{self, EpollCreateFlags, EpollEvent, EpollFlags, EpollOp};
use nix::unistd;
use snafu::ResultExt;
use std::os::unix::io::{AsRawFd, RawFd};

#[derive(Debug)]
pub(crate) struct Poll {
    epfd: RawFd,
    registered: usize,
}

impl Poll {
    pub(crate) fn new() -> Result<Poll> {
        let epfd = epoll::epoll_create1(EpollCreateFlags::EPOLL_CLOEXEC).context(NixSnafu)?;
        Ok(Poll {
            epfd,
            registered: 0,
        })
    }

    /// watch `fd` for `events`, reporting readiness under `token`
    pub(crate) fn register(&mut self, fd: RawFd, events: u32, token: u64) -> Result<()> {
        let mut ev = EpollEvent::new(EpollFlags::from_bits_truncate(events as i32), token);
        epoll::epoll_ctl(self.epfd, EpollOp::EpollCtlAdd, fd, &mut ev).context(NixSnafu)?;
        self.registered += 1;
        Ok(())
    }

    pub(crate) fn unregister(&mut self, fd: RawFd) -> Result<()> {
        epoll::epoll_ctl(self.epfd, EpollOp::EpollCtlDel, fd, None).context(NixSnafu)?;
        self.registered = self.registered.saturating_sub(1);
        Ok(())
    }

    /// Returns (token, events) pairs. An interrupted wait yields nothing.
    pub(crate) fn wait(&self, timeout: i32) -> Result<Vec<(u64, u32)>> {
        let mut ready = vec![EpollEvent::empty(); self.registered.max(1)];
        let n = match epoll::epoll_wait(self.epfd, &mut ready, timeout as isize) {
            Ok(n) => n,
            Err(Errno::EINTR) => 0,
            Err(e) => return Err(Error::Nix { source: e }),
        };

        Ok(ready[..n]
            .iter()
            .map(|ev| (ev.data(), ev.events().bits() as u32))
            .collect())
    }
}

impl AsRawFd for Poll {
    fn as_raw_fd(&self) -> RawFd {
        self.epfd
    }
}

impl Drop for Poll {
    fn drop(&mut self) {
        let _ = unistd::close(self.epfd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, os::unix::net::UnixStream};

    #[test]
    fn test_register_and_wait() {
        let mut poll = Poll::new().unwrap();
        assert!(poll.as_raw_fd() > 0);

        let (a, mut b) = UnixStream::pair().unwrap();
        poll.register(a.as_raw_fd(), libc::EPOLLIN as u32, 7).unwrap();
        assert!(poll.wait(0).unwrap().is_empty());

        b.write_all(b"x").unwrap();
        let ready = poll.wait(100).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, 7);
        assert_ne!(ready[0].1 & libc::EPOLLIN as u32, 0);

        poll.unregister(a.as_raw_fd()).unwrap();
        assert!(poll.wait(0).unwrap().is_empty());
        assert!(poll.unregister(a.as_raw_fd()).is_err());
    }
}
