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

use crate::error::*;
use cmdproto::proto::execute::ExecuterAction;
use cmdproto::proto::ProstServerStream;
use event::{EventType, Events, Source};
use nix::sys::{socket, stat};
use std::os::unix::io::RawFd;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// a client that stops talking mid-request must not stall the loop
const CLIENT_IO_TIMEOUT: Duration = Duration::from_secs(1);

pub(super) struct Commands<T> {
    // associated objects
    command_action: Rc<T>,

    // owned objects
    socket_fd: RawFd,
}

impl<T> Drop for Commands<T> {
    fn drop(&mut self) {
        basic::fd::close(self.socket_fd);
    }
}

impl<T> Commands<T>
where
    T: ExecuterAction,
{
    /// Listen on `sock`, creating its directory and the notify directory
    /// next to it.
    pub(super) fn new(sock: &Path, comm_action: T) -> Result<Self> {
        let notify = constants::notify_dir(sock);
        std::fs::create_dir_all(&notify).context(IoSnafu)?;

        /* remove the old socket if it exists */
        match std::fs::symlink_metadata(sock) {
            Ok(m) if !m.file_type().is_symlink() => {
                std::fs::remove_file(sock).context(IoSnafu)?;
            }
            _ => {}
        }

        let addr = socket::UnixAddr::new(sock).context(NixSnafu)?;
        let socket_fd = socket::socket(
            socket::AddressFamily::Unix,
            socket::SockType::Stream,
            socket::SockFlag::SOCK_CLOEXEC | socket::SockFlag::SOCK_NONBLOCK,
            None,
        )
        .context(NixSnafu)?;
        /* create the socket with mode 666 */
        let old_mask = stat::umask(stat::Mode::from_bits_truncate(!0o666));
        let bound = socket::bind(socket_fd, &addr);
        /* restore our umask */
        let _ = stat::umask(old_mask);
        if let Err(e) = bound.and_then(|_| socket::listen(socket_fd, 128)) {
            basic::fd::close(socket_fd);
            return Err(Error::Nix { source: e });
        }
        log::debug!("listening on {:?}", sock);

        Ok(Commands {
            command_action: Rc::new(comm_action),
            socket_fd,
        })
    }

    pub fn dispatch_commands(&self) -> i32 {
        let client = match socket::accept4(self.socket_fd, socket::SockFlag::SOCK_CLOEXEC) {
            Err(nix::Error::EAGAIN) | Err(nix::Error::EINTR) => return 0,
            Err(e) => {
                log::error!("Failed to accept connection: {}, ignoring.", e);
                return 0;
            }
            Ok(v) => v,
        };
        if let Err(e) = basic::socket::set_receive_timeout(client, CLIENT_IO_TIMEOUT)
            .and_then(|_| basic::socket::set_send_timeout(client, CLIENT_IO_TIMEOUT))
        {
            log::debug!("failed to set client timeout: {}", e);
        }
        let cred = match basic::socket::peer_credentials(client) {
            Err(e) => {
                log::error!(
                    "Failed to get the credentials of the connection: {}, refuse ready requests.",
                    e
                );
                None
            }
            Ok(v) => Some(v),
        };
        let dispatch = ProstServerStream::new(client, self.command_action.clone(), cred);
        match dispatch.process() {
            // the manager answers later and owns the fd now
            Ok(true) => return 0,
            Ok(false) => (),
            Err(e) => log::error!("Commands failed: {}", e),
        }
        basic::fd::close(client);
        0
    }
}

impl<T> Source for Commands<T>
where
    T: ExecuterAction,
{
    fn event_type(&self) -> EventType {
        EventType::Io
    }

    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN) as u32
    }

    fn dispatch(&self, _e: &Events) -> i32 {
        self.dispatch_commands()
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }

    fn fd(&self) -> RawFd {
        self.socket_fd
    }

    fn priority(&self) -> i8 {
        0i8
    }

    fn description(&self) -> String {
        String::from("control socket")
    }
}

#[cfg(test)]
mod tests {
    use super::Commands;
    use cmdproto::proto::execute::{ErrorCode, ExecuterAction, WaitCondition};
    use cmdproto::proto::{Action, CommandRequest, CommandResponse, ProstClientStream};
    use event::{EventState, Events, Source};
    use nix::sys::socket::UnixCredentials;
    use std::fmt;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::io::RawFd;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    struct TestError;

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "no such service")
        }
    }

    impl ErrorCode for TestError {
        fn error_code(&self) -> u32 {
            111
        }
    }

    struct TestExecAction;

    impl ExecuterAction for TestExecAction {
        type Error = TestError;

        fn resolve(&self, name: &str, _create: bool) -> Result<String, Self::Error> {
            match name {
                "a" => Ok(name.to_string()),
                _ => Err(TestError),
            }
        }

        fn up(&self, _name: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        fn down(&self, _name: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        fn hup(&self, _name: &str) -> Result<(), Self::Error> {
            Ok(())
        }

        fn restart(&self, _name: &str, _fast: bool) -> Result<(), Self::Error> {
            Ok(())
        }

        fn signal(&self, _name: &str, _signal: i32) -> Result<(), Self::Error> {
            Ok(())
        }

        fn pidof(&self, _name: &str) -> Option<i32> {
            None
        }

        fn check(&self, _name: &str) -> bool {
            true
        }

        fn ready(&self, _name: &str, _cred: Option<UnixCredentials>) -> Result<(), Self::Error> {
            Ok(())
        }

        fn wait(
            &self,
            _cond: WaitCondition,
            _names: Vec<String>,
            _client: RawFd,
        ) -> Result<Option<CommandResponse>, Self::Error> {
            Ok(Some(CommandResponse::ok("")))
        }

        fn rescan(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn list(&self) -> String {
            String::from("UP a (pid 7) (wstatus 0) 3s")
        }

        fn info(&self) -> String {
            String::from("# 1 1 0 0")
        }

        fn shutdown(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn reboot(&self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_control_socket_process() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("run/nitro.sock");
        let command: Rc<dyn Source> = Rc::new(Commands::new(&sock, TestExecAction).unwrap());
        assert!(dir.path().join("run/notify").is_dir());
        let mode = std::fs::metadata(&sock).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);

        let e = Events::new().unwrap();
        e.add_source(command.clone()).unwrap();
        e.set_enabled(command.clone(), EventState::On).unwrap();

        // the request is buffered in the socket before the loop runs
        let mut client = ProstClientStream::new(UnixStream::connect(&sock).unwrap());
        let handle = std::thread::spawn(move || {
            let list = client
                .execute(CommandRequest::new_global(Action::List))
                .unwrap();
            let mut client = ProstClientStream::new(UnixStream::connect(&sock).unwrap());
            let bad = client
                .execute(CommandRequest::new_service(Action::Up, vec!["b".to_string()]))
                .unwrap();
            (list, bad)
        });
        e.run(1000).unwrap();
        e.run(1000).unwrap();
        let (list, bad) = handle.join().unwrap();
        assert_eq!(list.error_code, 0);
        assert_eq!(list.message, "UP a (pid 7) (wstatus 0) 3s");
        assert_eq!(bad.error_code, 111);

        e.del_source(command).unwrap();
    }
}
