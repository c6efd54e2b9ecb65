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


//! file descriptor flags
use crate::error::*;
use constants::INVALID_FD;
use nix::fcntl::{FcntlArg, FdFlag, OFlag};
use std::os::unix::io::RawFd;

///
pub fn fd_nonblock(fd: RawFd, nonblock: bool) -> Result<()> {
    assert!(fd >= 0);

    let flags = nix::fcntl::fcntl(fd, FcntlArg::F_GETFL).context(NixSnafu)?;
    let fd_flag = OFlag::from_bits_truncate(flags);

    let nflag = match nonblock {
        true => fd_flag | OFlag::O_NONBLOCK,
        false => fd_flag & !OFlag::O_NONBLOCK,
    };

    if nflag == fd_flag {
        return Ok(());
    }

    nix::fcntl::fcntl(fd, FcntlArg::F_SETFL(nflag)).context(NixSnafu)?;

    Ok(())
}

///
pub fn fd_is_cloexec(fd: RawFd) -> bool {
    assert!(fd >= 0);

    let flags = nix::fcntl::fcntl(fd, FcntlArg::F_GETFD).unwrap_or(0);
    FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC)
}

/// a close-on-exec pipe, (read end, write end)
pub fn pipe_cloexec() -> Result<(RawFd, RawFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC).context(NixSnafu)
}

///
pub fn close(fd: RawFd) {
    if fd == INVALID_FD {
        return;
    }
    if let Err(e) = nix::unistd::close(fd) {
        log::warn!("close fd {} failed, errno: {}", fd, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_flags() {
        let (r, w) = pipe_cloexec().unwrap();
        assert!(fd_is_cloexec(r));
        assert!(fd_is_cloexec(w));

        nix::fcntl::fcntl(w, FcntlArg::F_SETFD(FdFlag::empty())).unwrap();
        assert!(!fd_is_cloexec(w));

        fd_nonblock(r, true).unwrap();
        let flags = nix::fcntl::fcntl(r, FcntlArg::F_GETFL).unwrap();
        assert!(OFlag::from_bits_truncate(flags).contains(OFlag::O_NONBLOCK));
        // nothing written yet
        assert_eq!(
            nix::unistd::read(r, &mut [0u8; 1]),
            Err(nix::errno::Errno::EAGAIN)
        );

        close(r);
        close(w);
        close(INVALID_FD);
    }
}
