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

//! The supervisor: registry, reaper, deadline timer and event fan-out
//! behind one handle. Every entry point leaves through `flush`, which
//! announces transitions, answers waiting clients and re-arms the timer.
use super::entry::ServiceState;
use super::machine::{Context, Phase, Reason, ServiceDb};
use super::notify::Broadcaster;
use super::sigchld::{ChildExit, Sigchld};
use super::timer::DeadlineTimer;
use super::waiter::PendingWait;
use crate::error::*;
use crate::manager::config::NitroConfig;
use cmdproto::proto::execute::{WaitCondition, EXIT_FAILURE};
use cmdproto::proto::CommandResponse;
use event::{EventState, Events, Source};
use nix::sys::signal::Signal;
use nix::sys::socket::UnixCredentials;
use nix::unistd::{self, Pid};
use std::cell::RefCell;
use std::convert::TryFrom;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

pub(crate) struct ServiceManager {
    event: Rc<Events>,
    timer: Rc<DeadlineTimer>,
    sigchld: Rc<Sigchld>,
    notifier: Broadcaster,
    db: RefCell<ServiceDb>,
    waits: RefCell<Vec<Rc<PendingWait>>>,
    me: Weak<ServiceManager>,
}

impl ServiceManager {
    pub(crate) fn new(
        eventr: &Rc<Events>,
        config: Rc<NitroConfig>,
        root: &Path,
        sock: &Path,
    ) -> Rc<ServiceManager> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let sm = Rc::new_cyclic(|me: &Weak<ServiceManager>| ServiceManager {
            event: Rc::clone(eventr),
            timer: DeadlineTimer::new(eventr),
            sigchld: Sigchld::new(eventr),
            notifier: Broadcaster::new(&constants::notify_dir(sock)),
            db: RefCell::new(ServiceDb::new(Context {
                root,
                sock: sock.to_path_buf(),
                config,
                event: Rc::clone(eventr),
                owner: me.clone(),
                pid1: unistd::getpid() == Pid::from_raw(1),
            })),
            waits: RefCell::new(Vec::new()),
            me: me.clone(),
        });
        sm.timer.set_manager(&sm);
        sm.sigchld.set_manager(&sm);
        sm
    }

    /// Scan the root and enter the boot sequence.
    pub(crate) fn boot(&self) -> Result<()> {
        {
            let mut db = self.db.borrow_mut();
            db.rescan()?;
            db.boot();
        }
        self.flush();
        Ok(())
    }

    pub(crate) fn phase(&self) -> Phase {
        self.db.borrow().phase
    }

    pub(crate) fn root(&self) -> PathBuf {
        self.db.borrow().ctx.root.clone()
    }

    /// SIGCHLD arrived
    pub(crate) fn child_sigchld_enable(&self, enable: bool) -> i32 {
        self.sigchld.enable(enable)
    }

    pub(crate) fn child_exited(&self, pid: Pid, exit: ChildExit) {
        self.db.borrow_mut().child_exited(pid, exit);
        self.flush();
    }

    pub(crate) fn ready_notified(&self, name: &str, fd: RawFd, ready: bool) {
        self.db.borrow_mut().ready_notified(name, fd, ready);
        self.flush();
    }

    pub(crate) fn deadlines_due(&self) {
        self.db.borrow_mut().deadlines_due();
        self.flush();
    }

    fn with_db<R>(&self, f: impl FnOnce(&mut ServiceDb) -> Result<R>) -> Result<R> {
        let res = f(&mut self.db.borrow_mut());
        self.flush();
        res
    }

    pub(crate) fn resolve(&self, name: &str, create: bool) -> Result<String> {
        self.db.borrow().resolve(name, create)
    }

    pub(crate) fn up(&self, name: &str) -> Result<()> {
        self.with_db(|db| db.up(name))
    }

    pub(crate) fn down(&self, name: &str, sig: Signal) -> Result<()> {
        self.with_db(|db| db.down(name, sig))
    }

    pub(crate) fn restart(&self, name: &str, fast: bool) -> Result<()> {
        self.with_db(|db| db.restart(name, fast))
    }

    pub(crate) fn signal(&self, name: &str, signo: i32) -> Result<()> {
        let sig = Signal::try_from(signo).map_err(|_| Error::Other {
            msg: format!("invalid signal {}", signo),
        })?;
        self.with_db(|db| db.signal(name, sig))
    }

    pub(crate) fn pidof(&self, name: &str) -> Option<i32> {
        self.db
            .borrow()
            .services
            .get(name)
            .and_then(|sv| sv.pid)
            .map(|p| p.as_raw())
    }

    pub(crate) fn check(&self, name: &str) -> bool {
        self.db
            .borrow()
            .services
            .get(name)
            .map_or(false, |sv| sv.state.is_up())
    }

    /// `ready` is accepted from the run process or one of its descendants.
    pub(crate) fn ready(&self, name: &str, cred: Option<UnixCredentials>) -> Result<()> {
        let refused = |msg: &str| Error::Refused {
            name: name.to_string(),
            msg: msg.to_string(),
        };
        let cred = cred.ok_or_else(|| refused("no peer credentials"))?;
        let pid = self
            .db
            .borrow()
            .services
            .get(name)
            .and_then(|sv| sv.pid)
            .ok_or_else(|| refused("not running"))?;
        let caller = Pid::from_raw(cred.pid());
        if caller != pid && !basic::process::is_descendant(caller, pid) {
            return Err(refused("ready must come from the service itself"));
        }
        self.with_db(|db| {
            db.mark_ready(name);
            Ok(())
        })
    }

    pub(crate) fn rescan(&self) -> Result<()> {
        log::info!("rescanning");
        self.with_db(|db| db.rescan())
    }

    pub(crate) fn list(&self) -> String {
        self.db.borrow().list()
    }

    /// `# <daemon pid> <services> <reaps> <service reaps>`
    pub(crate) fn info(&self) -> String {
        let db = self.db.borrow();
        format!(
            "# {} {} {} {}",
            unistd::getpid(),
            db.service_count(),
            db.reaps,
            db.service_reaps
        )
    }

    pub(crate) fn shutdown(&self, reason: Reason) {
        self.db.borrow_mut().begin_shutdown(reason);
        self.flush();
    }

    fn evaluate(&self, cond: WaitCondition, names: &[String]) -> Option<CommandResponse> {
        let db = self.db.borrow();
        let states: Vec<(&String, Option<ServiceState>)> = names
            .iter()
            .map(|n| (n, db.services.get(n).map(|sv| sv.state)))
            .collect();
        let all = |f: &dyn Fn(Option<ServiceState>) -> bool| states.iter().all(|(_, s)| f(*s));

        match cond {
            WaitCondition::Started => {
                if let Some((name, _)) = states
                    .iter()
                    .find(|(_, s)| matches!(s, None | Some(ServiceState::Fatal)))
                {
                    return Some(CommandResponse::failed(
                        EXIT_FAILURE,
                        format!("{} failed to start", name),
                    ));
                }
                all(&|s| s.map_or(false, |s| s.is_up())).then(|| CommandResponse::ok(""))
            }
            WaitCondition::Stopped => {
                all(&|s| s.map_or(true, |s| s.is_settled())).then(|| CommandResponse::ok(""))
            }
            WaitCondition::Up => {
                all(&|s| s.map_or(false, |s| s.is_up())).then(|| CommandResponse::ok(""))
            }
            WaitCondition::Down => all(&|s| s.map_or(true, |s| s == ServiceState::Down))
                .then(|| CommandResponse::ok("")),
        }
    }

    /// Answer now if `cond` already holds, otherwise keep `client` until it does.
    pub(crate) fn wait(
        &self,
        cond: WaitCondition,
        names: Vec<String>,
        client: RawFd,
    ) -> Result<Option<CommandResponse>> {
        if let Some(resp) = self.evaluate(cond, &names) {
            return Ok(Some(resp));
        }
        let wait = Rc::new(PendingWait::new(cond, names, client, self.me.clone()));
        let source: Rc<dyn Source> = wait.clone();
        if let Err(e) = self
            .event
            .add_source(source.clone())
            .and_then(|_| self.event.set_enabled(source, EventState::On))
        {
            // the caller still answers on the connection and closes it
            let source: Rc<dyn Source> = wait.clone();
            let _ = self.event.del_source(source);
            wait.disown();
            return Err(Error::Event { source: e });
        }
        self.waits.borrow_mut().push(wait);
        Ok(None)
    }

    fn finish_wait(&self, client: RawFd, resp: Option<CommandResponse>) {
        let wait = {
            let mut waits = self.waits.borrow_mut();
            match waits.iter().position(|w| w.client() == client) {
                Some(i) => waits.remove(i),
                None => return,
            }
        };
        let source: Rc<dyn Source> = wait.clone();
        if let Err(e) = self.event.del_source(source) {
            log::debug!("failed to unregister wait: {}", e);
        }
        if let Some(resp) = resp {
            if let Err(e) = cmdproto::proto::frame::send_response(client, &resp) {
                log::debug!("failed to answer waiting client: {}", e);
            }
        }
    }

    /// the waiting client hung up
    pub(crate) fn cancel_wait(&self, client: RawFd) {
        log::debug!("waiting client {} went away", client);
        self.finish_wait(client, None);
    }

    fn resolve_waits(&self) {
        let waits = self.waits.borrow().clone();
        for wait in waits {
            if let Some(resp) = self.evaluate(wait.cond, &wait.names) {
                self.finish_wait(wait.client(), Some(resp));
            }
        }
    }

    fn flush(&self) {
        let (events, deadline, phase) = {
            let mut db = self.db.borrow_mut();
            while db.advance_phase() {}
            db.collect_log_pipes();
            (db.take_events(), db.next_deadline(), db.phase)
        };
        for (name, state) in &events {
            self.notifier.send(name, *state);
        }
        self.resolve_waits();
        self.timer.arm(deadline);
        if let Phase::Done(reason) = phase {
            log::info!("{} complete", reason);
            self.event.set_exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::entry::Script;
    use crate::service::CHILDREN_LOCK;
    use std::fs;
    use std::io::Read;
    use std::os::unix::fs::symlink;
    use std::os::unix::net::UnixDatagram;
    use std::time::{Duration, Instant};

    fn script(dir: &Path, name: &str, body: &str) {
        libtests::write_script(dir, name, body).unwrap();
    }

    struct Fixture {
        _guard: std::sync::MutexGuard<'static, ()>,
        _dir: tempfile::TempDir,
        root: PathBuf,
        event: Rc<Events>,
        sm: Rc<ServiceManager>,
        listener: UnixDatagram,
    }

    fn fixture(build: impl FnOnce(&Path)) -> Fixture {
        // the reaper collects any child of the test process
        let guard = CHILDREN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sv");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(dir.path().join("notify")).unwrap();
        build(&root);
        let listener = UnixDatagram::bind(dir.path().join("notify/ALL,test")).unwrap();
        listener.set_nonblocking(true).unwrap();

        let event = Rc::new(Events::new().unwrap());
        let config = NitroConfig {
            ReadyTimeoutMSec: 100,
            SetupRetryMSec: 100,
            MinUptimeMSec: 0,
            RestartDelayMSec: 100,
            KillTimeoutMSec: 1000,
            ..Default::default()
        };
        let sm = ServiceManager::new(
            &event,
            Rc::new(config),
            &root,
            &dir.path().join("nitro.sock"),
        );
        Fixture {
            _guard: guard,
            _dir: dir,
            root,
            event,
            sm,
            listener,
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let db = self.sm.db.borrow();
            for sv in db.services.values() {
                for pid in sv.pid.into_iter().chain(sv.helper.map(|(p, _)| p)) {
                    let _ = nix::sys::signal::kill(pid, Signal::SIGKILL);
                    let _ = nix::sys::wait::waitpid(pid, None);
                }
            }
        }
    }

    impl Fixture {
        /// drive the loop by hand until `done` or a timeout
        fn run_until(&self, done: impl Fn(&ServiceManager) -> bool) -> bool {
            let until = Instant::now() + Duration::from_secs(10);
            while Instant::now() < until {
                if done(&self.sm) {
                    return true;
                }
                // no signal source is registered here, poll the reaper,
                // then let the lower priority sources behind it run
                self.sm.child_sigchld_enable(true);
                self.event.run(20).unwrap();
                for _ in 0..8 {
                    self.event.run(0).unwrap();
                }
            }
            done(&self.sm)
        }

        fn state(&self, name: &str) -> Option<ServiceState> {
            self.sm.db.borrow().services.get(name).map(|sv| sv.state)
        }

        fn events(&self) -> Vec<(u8, String)> {
            let mut out = Vec::new();
            let mut buf = [0u8; 256];
            while let Ok(n) = self.listener.recv(&mut buf) {
                out.push((buf[2], String::from_utf8_lossy(&buf[3..n]).to_string()));
            }
            out
        }
    }

    #[test]
    fn test_start_and_stop() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        assert_eq!(f.sm.phase(), Phase::Running);
        assert!(f.run_until(|sm| sm.check("a")));
        assert!(f.sm.pidof("a").is_some());
        assert!(f.sm.list().starts_with("UP a (pid "));

        f.sm.down("a", Signal::SIGTERM).unwrap();
        assert!(f.run_until(|sm| sm.pidof("a").is_none()
            && sm.db.borrow().services["a"].state == ServiceState::Down));
        let events = f.events();
        let codes: Vec<u8> = events.iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![3, 4, 6, 1]);
        assert!(f.sm.info().ends_with(" 1 1 1"));
    }

    #[test]
    fn test_setup_fatal_and_restart() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "setup", "exit 111");
            script(&root.join("a"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|_| f.state("a") == Some(ServiceState::Fatal)));

        // up leaves FATAL alone, restart retries
        f.sm.up("a").unwrap();
        assert_eq!(f.state("a"), Some(ServiceState::Fatal));
        f.sm.restart("a", false).unwrap();
        assert_eq!(f.state("a"), Some(ServiceState::Setup));
        assert!(f.run_until(|_| f.state("a") == Some(ServiceState::Fatal)));
    }

    #[test]
    fn test_oneshot() {
        let f = fixture(|root| {
            fs::create_dir(root.join("once")).unwrap();
            script(&root.join("once"), "setup", "exit 0");
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|sm| sm.check("once")));
        assert_eq!(f.state("once"), Some(ServiceState::Oneshot));
        f.sm.down("once", Signal::SIGTERM).unwrap();
        assert_eq!(f.state("once"), Some(ServiceState::Down));
    }

    #[test]
    fn test_unexpected_exit_runs_finish() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
            script(&root.join("a"), "finish", "echo \"$1 $2\" > last");
            fs::write(root.join("a/down"), "").unwrap();
        });
        f.sm.boot().unwrap();
        f.sm.up("a").unwrap();
        assert!(f.run_until(|sm| sm.check("a")));
        // pretend a signal command came in
        f.sm.signal("a", libc::SIGKILL).unwrap();
        assert!(f.run_until(|sm| {
            let db = sm.db.borrow();
            db.services["a"].state == ServiceState::Up && db.services["a"].reaps == 2
        }));
        let finish = fs::read_to_string(f.root.join("a/last")).unwrap();
        assert_eq!(finish, "-1 9\n");
        let codes: Vec<u8> = f.events().iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![1, 3, 4, 7, 6, 3, 4]);
    }

    #[test]
    fn test_wait_resolves_on_client() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        let (ours, theirs) = std::os::unix::net::UnixStream::pair().unwrap();
        let fd = std::os::unix::io::IntoRawFd::into_raw_fd(ours);
        let res = f
            .sm
            .wait(WaitCondition::Up, vec!["a".to_string()], fd)
            .unwrap();
        assert!(res.is_none());
        assert!(f.run_until(|sm| sm.waits.borrow().is_empty()));

        // the answer is sent and the connection closed
        let mut theirs = theirs;
        let answer = cmdproto::proto::frame::read_response(&mut theirs).unwrap();
        assert_eq!(answer.error_code, 0);
        let mut rest = Vec::new();
        theirs.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn test_wait_cancelled() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
            fs::write(root.join("a/down"), "").unwrap();
        });
        f.sm.boot().unwrap();
        let (ours, theirs) = std::os::unix::net::UnixStream::pair().unwrap();
        let fd = std::os::unix::io::IntoRawFd::into_raw_fd(ours);
        assert!(f
            .sm
            .wait(WaitCondition::Up, vec!["a".to_string()], fd)
            .unwrap()
            .is_none());
        drop(theirs);
        assert!(f.run_until(|sm| sm.waits.borrow().is_empty()));
        assert_eq!(f.state("a"), Some(ServiceState::Down));
    }

    #[test]
    fn test_shutdown_runs_sys_finish() {
        let f = fixture(|root| {
            fs::create_dir(root.join("SYS")).unwrap();
            script(&root.join("SYS"), "setup", "exit 0");
            script(&root.join("SYS"), "finish", "echo \"$1 $2 $3\" > /dev/null");
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        assert_eq!(f.sm.phase(), Phase::Booting);
        assert!(f.run_until(|sm| sm.check("a")));
        assert_eq!(f.sm.phase(), Phase::Running);

        f.sm.shutdown(Reason::Shutdown);
        assert!(f.run_until(|sm| sm.phase() == Phase::Done(Reason::Shutdown)));
        assert!(f.event.is_exited());
        assert_eq!(f.state("a"), Some(ServiceState::Down));
        // list never shows SYS
        assert_eq!(f.sm.list().lines().count(), 1);
    }

    #[test]
    fn test_down_while_finishing() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
            script(&root.join("a"), "finish", "sleep 0.5");
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|sm| sm.check("a")));
        f.sm.signal("a", libc::SIGKILL).unwrap();
        assert!(f.run_until(|sm| {
            matches!(sm.db.borrow().services["a"].helper, Some((_, Script::Finish)))
        }));

        // finish asks for the service to stay down
        f.sm.down("a", Signal::SIGTERM).unwrap();
        assert!(f.run_until(|_| f.state("a") == Some(ServiceState::Down)));
        assert!(f.sm.pidof("a").is_none());
        let codes: Vec<u8> = f.events().iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![3, 4, 7, 6, 1]);

        f.sm.up("a").unwrap();
        assert!(f.run_until(|sm| sm.check("a")));
        let codes: Vec<u8> = f.events().iter().map(|(c, _)| *c).collect();
        assert_eq!(codes, vec![3, 4]);
    }

    #[test]
    fn test_setup_retried() {
        let f = fixture(|root| {
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "setup", "exit 2");
            script(&root.join("a"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|sm| sm.db.borrow().services["a"].reaps >= 3));
        assert_eq!(f.state("a"), Some(ServiceState::Setup));
        assert!(f.sm.pidof("a").is_none());

        let events = f.events();
        assert!(events.len() >= 3);
        assert!(events.iter().all(|(c, n)| *c == 2 && n == "a"));
    }

    #[test]
    fn test_reboot_reruns_boot() {
        let f = fixture(|root| {
            fs::create_dir(root.join("SYS")).unwrap();
            script(&root.join("SYS"), "setup", "echo boot >> boots");
            script(&root.join("SYS"), "finish", "echo \"$@\" > finish_args");
            fs::create_dir(root.join("a")).unwrap();
            script(&root.join("a"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|sm| sm.check("a")));
        let first = f.sm.pidof("a");

        f.sm.shutdown(Reason::Reboot);
        assert!(f.run_until(|sm| sm.phase() != Phase::Running));
        assert!(f.run_until(|sm| sm.phase() == Phase::Running && sm.check("a")));
        assert!(!f.event.is_exited());
        assert_ne!(f.sm.pidof("a"), first);

        let args = fs::read_to_string(f.root.join("SYS/finish_args")).unwrap();
        assert_eq!(args, "0 0 reboot\n");
        let boots = fs::read_to_string(f.root.join("SYS/boots")).unwrap();
        assert_eq!(boots.lines().count(), 2);
    }

    #[test]
    fn test_log_relink_waits_for_restart() {
        let f = fixture(|root| {
            for name in ["p", "a", "b"] {
                fs::create_dir(root.join(name)).unwrap();
            }
            script(&root.join("p"), "run", "while :; do echo tick; sleep 0.1; done");
            symlink("../a", root.join("p/log")).unwrap();
            script(&root.join("a"), "run", "exec cat > out");
            script(&root.join("b"), "run", "exec sleep 100");
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|sm| sm.check("p") && sm.check("a")));

        fs::remove_file(f.root.join("p/log")).unwrap();
        symlink("../b", f.root.join("p/log")).unwrap();
        f.sm.rescan().unwrap();
        let target = f.sm.db.borrow().services["p"].log_target.clone();
        assert_eq!(target.as_deref(), Some("a"));

        // the consumer comes back on the same pipe
        let first = f.sm.pidof("a");
        f.sm.restart("a", true).unwrap();
        assert!(f.run_until(|sm| sm.check("a") && sm.pidof("a") != first));
        let out = f.root.join("a/out");
        assert!(f.run_until(|_| fs::read_to_string(&out).map_or(false, |s| s.contains("tick"))));
        assert_eq!(
            f.sm.db.borrow().services["p"].log_target.as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_vanished_instance_removed() {
        let f = fixture(|root| {
            fs::create_dir(root.join("sv@")).unwrap();
            script(&root.join("sv@"), "run", "exec sleep 100");
            symlink("sv@", root.join("sv@a")).unwrap();
        });
        f.sm.boot().unwrap();
        assert!(f.run_until(|sm| sm.check("sv@a")));

        fs::remove_file(f.root.join("sv@a")).unwrap();
        fs::remove_dir_all(f.root.join("sv@")).unwrap();
        f.sm.rescan().unwrap();
        assert!(f.run_until(|sm| !sm.db.borrow().services.contains_key("sv@a")));
        assert!(f.events().contains(&(1, "sv@a".to_string())));
        assert_eq!(f.sm.list(), "");
    }
}
