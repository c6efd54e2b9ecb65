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

//! Convert the command request into the corresponding execution action
use super::{Action, CommandRequest, CommandResponse};
use crate::error::ERROR_CODE_MASK_PRINT_STDOUT;

use nix::sys::socket::UnixCredentials;
use std::{fmt::Display, os::unix::io::RawFd, rc::Rc};

/// Exit status for a failed action
pub const EXIT_FAILURE: u32 = 1;

/// What a blocked client is waiting for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitCondition {
    /// UP or ONESHOT, a FATAL service fails the wait (start, restart)
    Started,
    /// DOWN or FATAL (stop)
    Stopped,
    /// UP or ONESHOT, failures keep waiting (wait-up)
    Up,
    /// DOWN (wait-down)
    Down,
}

/// Errors that know the exit status the client should report
pub trait ErrorCode {
    /// exit status, never 0
    fn error_code(&self) -> u32;
}

/// The outcome of one request
#[derive(Debug)]
pub enum Reply {
    /// answer now and close the connection
    Done(CommandResponse),
    /// the manager kept the connection and answers later
    Deferred,
}

/// ExecuterAction
pub trait ExecuterAction {
    #[allow(missing_docs)]
    type Error: Display + ErrorCode;
    /// map a requested name to a registered service name, without side effects;
    /// with `create`, an instance of a known template is accepted too
    fn resolve(&self, name: &str, create: bool) -> Result<String, Self::Error>;
    /// want the service up, creating an instance record if needed
    fn up(&self, name: &str) -> Result<(), Self::Error>;
    /// want the service down and terminate it
    fn down(&self, name: &str) -> Result<(), Self::Error>;
    /// like down, with SIGHUP
    fn hup(&self, name: &str) -> Result<(), Self::Error>;
    /// cycle the service, `fast` skips the crash-loop delay
    fn restart(&self, name: &str, fast: bool) -> Result<(), Self::Error>;
    /// deliver a signal to the run process
    fn signal(&self, name: &str, signal: i32) -> Result<(), Self::Error>;
    /// pid of the run process
    fn pidof(&self, name: &str) -> Option<i32>;
    /// the service counts as running
    fn check(&self, name: &str) -> bool;
    /// readiness self-report from a process of the service
    fn ready(&self, name: &str, cred: Option<UnixCredentials>) -> Result<(), Self::Error>;
    /// block `client` until `cond` holds for all names; `Ok(None)` hands the fd
    /// over to the manager, which answers once the condition resolves
    fn wait(
        &self,
        cond: WaitCondition,
        names: Vec<String>,
        client: RawFd,
    ) -> Result<Option<CommandResponse>, Self::Error>;
    /// re-sync the registry with the supervision root
    fn rescan(&self) -> Result<(), Self::Error>;
    /// one line per service
    fn list(&self) -> String;
    /// daemon counters
    fn info(&self) -> String;
    /// begin the shutdown sequence
    fn shutdown(&self) -> Result<(), Self::Error>;
    /// begin the reboot sequence
    fn reboot(&self) -> Result<(), Self::Error>;
}

fn failed<E: Display + ErrorCode>(e: E) -> CommandResponse {
    CommandResponse::failed(e.error_code(), e.to_string())
}

fn new_line_break(s: &mut String) {
    if !s.is_empty() {
        *s += "\n";
    }
}

/// Depending on the type of request
pub(crate) fn dispatch<T>(
    cmd: CommandRequest,
    manager: Rc<T>,
    cred: Option<UnixCredentials>,
    client: RawFd,
) -> Reply
where
    T: ExecuterAction,
{
    let action = match Action::from_i32(cmd.action) {
        Some(a) => a,
        None => {
            return Reply::Done(CommandResponse::failed(
                EXIT_FAILURE,
                format!("unknown action {}", cmd.action),
            ))
        }
    };

    if action.takes_names() && cmd.names.is_empty() {
        return Reply::Done(CommandResponse::failed(
            EXIT_FAILURE,
            format!("{}: no service given", action),
        ));
    }

    // every name must be valid before anything is touched
    let mut names = Vec::with_capacity(cmd.names.len());
    for name in &cmd.names {
        match manager.resolve(name, action.creates_service()) {
            Ok(n) => names.push(n),
            Err(e) => return Reply::Done(failed(e)),
        }
    }

    let each = |f: &dyn Fn(&str) -> Result<(), T::Error>| -> Result<(), T::Error> {
        for name in &names {
            f(name)?;
        }
        Ok(())
    };

    let res = match action {
        Action::List => Ok(CommandResponse::ok(manager.list())),
        Action::Info => Ok(CommandResponse::ok(manager.info())),
        Action::Up => each(&|n| manager.up(n)).map(|_| CommandResponse::ok("")),
        Action::Down => each(&|n| manager.down(n)).map(|_| CommandResponse::ok("")),
        Action::Hup => each(&|n| manager.hup(n)).map(|_| CommandResponse::ok("")),
        Action::Signal => {
            each(&|n| manager.signal(n, cmd.signal)).map(|_| CommandResponse::ok(""))
        }
        Action::Start => each(&|n| manager.up(n)).map(|_| CommandResponse::ok("")),
        Action::Stop => each(&|n| manager.down(n)).map(|_| CommandResponse::ok("")),
        Action::Restart => {
            each(&|n| manager.restart(n, false)).map(|_| CommandResponse::ok(""))
        }
        Action::FastRestart => {
            each(&|n| manager.restart(n, true)).map(|_| CommandResponse::ok(""))
        }
        Action::Ready => each(&|n| manager.ready(n, cred)).map(|_| CommandResponse::ok("")),
        Action::Check => Ok(check(&*manager, &names)),
        Action::Pidof => Ok(pidof(&*manager, &names)),
        Action::Rescan => manager.rescan().map(|_| CommandResponse::ok("")),
        Action::Shutdown => manager.shutdown().map(|_| CommandResponse::ok("")),
        Action::Reboot => manager.reboot().map(|_| CommandResponse::ok("")),
        Action::WaitUp | Action::WaitDown => Ok(CommandResponse::ok("")),
    };

    let cond = match action {
        Action::Start | Action::Restart | Action::FastRestart => WaitCondition::Started,
        Action::Stop => WaitCondition::Stopped,
        Action::WaitUp => WaitCondition::Up,
        Action::WaitDown => WaitCondition::Down,
        _ => {
            return match res {
                Ok(r) => Reply::Done(r),
                Err(e) => Reply::Done(failed(e)),
            }
        }
    };
    if let Err(e) = res {
        return Reply::Done(failed(e));
    }

    match manager.wait(cond, names, client) {
        Ok(Some(r)) => Reply::Done(r),
        Ok(None) => Reply::Deferred,
        Err(e) => Reply::Done(failed(e)),
    }
}

fn check<T: ExecuterAction>(manager: &T, names: &[String]) -> CommandResponse {
    match names.iter().find(|n| !manager.check(n)) {
        None => CommandResponse::ok(""),
        Some(_) => CommandResponse::failed(EXIT_FAILURE, ""),
    }
}

fn pidof<T: ExecuterAction>(manager: &T, names: &[String]) -> CommandResponse {
    let mut reply = String::new();
    let mut missing = false;
    for name in names {
        match manager.pidof(name) {
            Some(pid) => {
                new_line_break(&mut reply);
                reply += &pid.to_string();
            }
            None => missing = true,
        }
    }
    if missing {
        CommandResponse::failed(EXIT_FAILURE | ERROR_CODE_MASK_PRINT_STDOUT, reply)
    } else {
        CommandResponse::ok(reply)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fmt;

    #[derive(Debug)]
    pub(crate) struct TestError(pub String);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "no such service: {}", self.0)
        }
    }

    impl ErrorCode for TestError {
        fn error_code(&self) -> u32 {
            111
        }
    }

    /// Records every mutating call; "a" and "b" exist, "b" is running as pid 42
    #[derive(Default)]
    pub(crate) struct TestExecAction {
        pub calls: RefCell<Vec<String>>,
        pub defer: bool,
    }

    impl ExecuterAction for TestExecAction {
        type Error = TestError;

        fn resolve(&self, name: &str, create: bool) -> Result<String, Self::Error> {
            match name {
                "a" | "b" => Ok(name.to_string()),
                "t@x" if create => Ok(name.to_string()),
                _ => Err(TestError(name.to_string())),
            }
        }

        fn up(&self, name: &str) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push(format!("up {}", name));
            Ok(())
        }

        fn down(&self, name: &str) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push(format!("down {}", name));
            Ok(())
        }

        fn hup(&self, name: &str) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push(format!("hup {}", name));
            Ok(())
        }

        fn restart(&self, name: &str, fast: bool) -> Result<(), Self::Error> {
            self.calls
                .borrow_mut()
                .push(format!("restart {} {}", name, fast));
            Ok(())
        }

        fn signal(&self, name: &str, signal: i32) -> Result<(), Self::Error> {
            self.calls
                .borrow_mut()
                .push(format!("signal {} {}", name, signal));
            Ok(())
        }

        fn pidof(&self, name: &str) -> Option<i32> {
            (name == "b").then(|| 42)
        }

        fn check(&self, name: &str) -> bool {
            name == "b"
        }

        fn ready(&self, name: &str, _cred: Option<UnixCredentials>) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push(format!("ready {}", name));
            Ok(())
        }

        fn wait(
            &self,
            cond: WaitCondition,
            names: Vec<String>,
            _client: RawFd,
        ) -> Result<Option<CommandResponse>, Self::Error> {
            self.calls
                .borrow_mut()
                .push(format!("wait {:?} {}", cond, names.join(",")));
            if self.defer {
                Ok(None)
            } else {
                Ok(Some(CommandResponse::ok("")))
            }
        }

        fn rescan(&self) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push("rescan".to_string());
            Ok(())
        }

        fn list(&self) -> String {
            "UP b (pid 42) (wstatus 0) 3s".to_string()
        }

        fn info(&self) -> String {
            "# 1 2 0 0".to_string()
        }

        fn shutdown(&self) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push("shutdown".to_string());
            Ok(())
        }

        fn reboot(&self) -> Result<(), Self::Error> {
            self.calls.borrow_mut().push("reboot".to_string());
            Ok(())
        }
    }

    fn run(manager: &Rc<TestExecAction>, action: Action, names: &[&str]) -> Reply {
        let cmd =
            CommandRequest::new_service(action, names.iter().map(|s| s.to_string()).collect());
        dispatch(cmd, manager.clone(), None, -1)
    }

    fn done(reply: Reply) -> CommandResponse {
        match reply {
            Reply::Done(r) => r,
            Reply::Deferred => panic!("unexpected deferred reply"),
        }
    }

    #[test]
    fn test_invalid_name_touches_nothing() {
        let manager = Rc::new(TestExecAction::default());
        let r = done(run(&manager, Action::Up, &["a", "nope", "b"]));
        assert_eq!(r.error_code, 111);
        assert_eq!(r.message, "no such service: nope");
        assert!(manager.calls.borrow().is_empty());
    }

    #[test]
    fn test_instance_needs_creating_action() {
        let manager = Rc::new(TestExecAction::default());
        assert_eq!(done(run(&manager, Action::Up, &["t@x"])).error_code, 0);
        assert_eq!(done(run(&manager, Action::Check, &["t@x"])).error_code, 111);
        assert_eq!(*manager.calls.borrow(), vec!["up t@x".to_string()]);
    }

    #[test]
    fn test_start_waits() {
        let manager = Rc::new(TestExecAction {
            defer: true,
            ..Default::default()
        });
        assert!(matches!(
            run(&manager, Action::Start, &["a", "b"]),
            Reply::Deferred
        ));
        assert_eq!(
            *manager.calls.borrow(),
            vec![
                "up a".to_string(),
                "up b".to_string(),
                "wait Started a,b".to_string()
            ]
        );
    }

    #[test]
    fn test_pidof_and_check() {
        let manager = Rc::new(TestExecAction::default());
        let r = done(run(&manager, Action::Pidof, &["b"]));
        assert_eq!((r.error_code, r.message.as_str()), (0, "42"));
        let r = done(run(&manager, Action::Pidof, &["a", "b"]));
        assert_eq!(r.error_code, 1 | ERROR_CODE_MASK_PRINT_STDOUT);
        assert_eq!(r.message, "42");
        assert_eq!(done(run(&manager, Action::Check, &["b"])).error_code, 0);
        assert_eq!(done(run(&manager, Action::Check, &["a", "b"])).error_code, 1);
    }

    #[test]
    fn test_missing_names() {
        let manager = Rc::new(TestExecAction::default());
        assert_eq!(done(run(&manager, Action::Down, &[])).error_code, 1);
        let r = done(run(&manager, Action::List, &[]));
        assert_eq!(r.error_code, 0);
        assert!(r.message.starts_with("UP b"));
    }

    #[test]
    fn test_signal() {
        let manager = Rc::new(TestExecAction::default());
        let cmd = CommandRequest::new_signal(19, vec!["a".to_string()]);
        assert_eq!(done(dispatch(cmd, manager.clone(), None, -1)).error_code, 0);
        assert_eq!(*manager.calls.borrow(), vec!["signal a 19".to_string()]);
    }
}
