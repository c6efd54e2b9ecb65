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


//!
use crate::error::*;
use nix::sys::socket::{self, sockopt, UnixCredentials};
use nix::sys::time::{TimeVal, TimeValLike};
use std::os::unix::prelude::RawFd;
use std::time::Duration;

/// bound blocking reads on a connected socket
pub fn set_receive_timeout(fd: RawFd, timeout: Duration) -> Result<()> {
    let tv = TimeVal::microseconds(timeout.as_micros() as i64);
    socket::setsockopt(fd, sockopt::ReceiveTimeout, &tv).context(NixSnafu)
}

/// bound blocking writes on a connected socket
pub fn set_send_timeout(fd: RawFd, timeout: Duration) -> Result<()> {
    let tv = TimeVal::microseconds(timeout.as_micros() as i64);
    socket::setsockopt(fd, sockopt::SendTimeout, &tv).context(NixSnafu)
}

/// credentials of the process on the other end of a unix stream socket
pub fn peer_credentials(fd: RawFd) -> Result<UnixCredentials> {
    socket::getsockopt(fd, sockopt::PeerCredentials).context(NixSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::{io::AsRawFd, net::UnixStream};

    #[test]
    fn test_peer_credentials() {
        let (a, _b) = UnixStream::pair().unwrap();
        let cred = peer_credentials(a.as_raw_fd()).unwrap();
        assert_eq!(cred.pid(), nix::unistd::getpid().as_raw());
        assert_eq!(cred.uid(), nix::unistd::getuid().as_raw());
    }

    #[test]
    fn test_receive_timeout() {
        let (a, _b) = UnixStream::pair().unwrap();
        set_receive_timeout(a.as_raw_fd(), Duration::from_millis(250)).unwrap();
        set_send_timeout(a.as_raw_fd(), Duration::from_millis(250)).unwrap();
        assert_eq!(
            a.read_timeout().unwrap(),
            Some(Duration::from_millis(250))
        );
    }
}
