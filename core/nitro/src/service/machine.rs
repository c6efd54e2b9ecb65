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

//! The registry and its state machine. Everything here runs synchronously
//! inside one event dispatch, transitions are queued in `outbox` and sent
//! by the owner after the dispatch.
use super::entry::{Deadline, ExitStatus, Script, Service, ServiceState, Wanted};
use super::logpipe::{self, LogRouter};
use super::name::{self, Kind};
use super::readiness::{self, ReadyPipe, Readiness};
use super::scan;
use super::sigchld::ChildExit;
use super::spawn::{self, FdPlan, FdSource};
use super::ServiceManager;
use crate::error::*;
use crate::manager::config::NitroConfig;
use basic::process::kill_and_cont;
use constants::{EXIT_FATAL, NITRO_SOCK_ENV, SYS_SERVICE};
use event::{EventState, Events, Source};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Why the daemon is going down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reason {
    Shutdown,
    Reboot,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Shutdown => write!(f, "shutdown"),
            Reason::Reboot => write!(f, "reboot"),
        }
    }
}

/// Global lifecycle of the daemon
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// SYS setup is running, nothing else is started implicitly
    Booting,
    Running,
    /// SYS finish is running
    Finishing(Reason),
    /// every service is being terminated
    Stopping(Reason),
    Done(Reason),
}

impl Phase {
    /// services may be started and restarted
    pub(crate) fn may_start(&self) -> bool {
        matches!(self, Phase::Booting | Phase::Running | Phase::Finishing(_))
    }
}

/// What the state machine needs from the outside world
pub(crate) struct Context {
    /// canonical supervision root
    pub(crate) root: PathBuf,
    pub(crate) sock: PathBuf,
    pub(crate) config: Rc<NitroConfig>,
    pub(crate) event: Rc<Events>,
    pub(crate) owner: Weak<ServiceManager>,
    pub(crate) pid1: bool,
}

pub(crate) struct ServiceDb {
    pub(crate) ctx: Context,
    pub(crate) services: BTreeMap<String, Service>,
    pub(crate) logs: LogRouter,
    pub(crate) phase: Phase,
    pub(crate) reaps: u64,
    pub(crate) service_reaps: u64,
    outbox: Vec<(String, ServiceState)>,
    sys_finish_started: bool,
}

impl ServiceDb {
    pub(crate) fn new(ctx: Context) -> Self {
        ServiceDb {
            ctx,
            services: BTreeMap::new(),
            logs: LogRouter::new(),
            phase: Phase::Booting,
            reaps: 0,
            service_reaps: 0,
            outbox: Vec::new(),
            sys_finish_started: false,
        }
    }

    /// transitions since the last call, in order
    pub(crate) fn take_events(&mut self) -> Vec<(String, ServiceState)> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.services
            .values()
            .filter_map(|sv| sv.deadline.map(|(t, _)| t))
            .min()
    }

    fn set_state(&mut self, name: &str, state: ServiceState) {
        if let Some(sv) = self.services.get_mut(name) {
            log::debug!("{}: {} -> {}", name, sv.state, state);
            sv.state = state;
            sv.changed = Instant::now();
            self.outbox.push((name.to_string(), state));
        }
        if state == ServiceState::Down && self.is_orphaned(name) {
            log::debug!("removing service {}", name);
            self.services.remove(name);
        }
    }

    /// Unanchored and with nothing left on disk to start it from again.
    fn is_orphaned(&self, name: &str) -> bool {
        let sv = match self.services.get(name) {
            Some(sv) if !sv.anchored && sv.is_idle() => sv,
            _ => return false,
        };
        match &sv.kind {
            Kind::Plain => true,
            Kind::Instance { .. } => self.template_path(&sv.kind).is_none(),
            _ => false,
        }
    }

    fn set_deadline(&mut self, name: &str, after: std::time::Duration, what: Deadline) {
        if let Some(sv) = self.services.get_mut(name) {
            sv.deadline = Some((Instant::now() + after, what));
        }
    }

    fn clear_deadline(&mut self, name: &str) {
        if let Some(sv) = self.services.get_mut(name) {
            sv.deadline = None;
        }
    }

    fn state_of(&self, name: &str) -> Option<ServiceState> {
        self.services.get(name).map(|sv| sv.state)
    }

    fn is_consumer(&self, name: &str) -> bool {
        self.services
            .values()
            .any(|sv| sv.log_target.as_deref() == Some(name))
    }

    fn template_path(&self, kind: &Kind) -> Option<PathBuf> {
        match kind {
            Kind::Instance { template, .. } => self
                .services
                .get(template)
                .filter(|t| t.kind.is_template())
                .map(|t| t.path.clone()),
            _ => None,
        }
    }

    /// Resolve a command argument to a service name. With `create` an
    /// unregistered instance of a known template is accepted as well.
    pub(crate) fn resolve(&self, arg: &str, create: bool) -> Result<String> {
        let name = name::from_argument(arg, &self.ctx.root)?;
        let kind = name::parse(&name)?;
        if kind.is_template() {
            return Err(Error::InvalidName { name });
        }
        if create && kind == Kind::Sys {
            return Err(Error::Refused {
                name,
                msg: "controlled by Shutdown and Reboot".to_string(),
            });
        }
        if self.services.contains_key(&name) || (create && self.template_path(&kind).is_some()) {
            return Ok(name);
        }
        Err(Error::UnknownService { name })
    }

    /// register an unanchored instance on first use
    fn ensure_instance(&mut self, name: &str, wanted: Wanted) -> Result<()> {
        if self.services.contains_key(name) {
            return Ok(());
        }
        let kind = name::parse(name)?;
        let path = match self.template_path(&kind) {
            Some(p) => p,
            None => return self.unknown(name),
        };
        log::info!("creating instance {}", name);
        let mut sv = Service::new(name, path, kind, wanted);
        sv.anchored = false;
        self.services.insert(name.to_string(), sv);
        Ok(())
    }

    fn refresh(&mut self, name: &str) {
        let root = self.ctx.root.clone();
        if let Some(sv) = self.services.get_mut(name) {
            sv.readiness = readiness::parse_notification_fd(&sv.path);
            sv.log_target = logpipe::resolve_target(&root, &sv.path, name, &sv.kind);
        }
    }

    /// create and start a template consumer the first time it is needed
    fn ensure_consumer(&mut self, name: &str) {
        let target = match self.services.get(name).and_then(|sv| sv.log_target.clone()) {
            Some(t) => t,
            None => return,
        };
        if target == name {
            log::warn!("{} logs into itself", name);
            return;
        }
        if self.services.contains_key(&target) {
            return;
        }
        let created = match name::parse(&target) {
            Ok(Kind::Instance { .. }) => self.ensure_instance(&target, Wanted::Up).is_ok(),
            _ => false,
        };
        if !created {
            log::warn!("log consumer {} of {} does not exist", target, name);
            return;
        }
        if self.phase.may_start() {
            self.start(&target);
        }
    }

    fn instance_args(&self, name: &str) -> Vec<String> {
        self.services
            .get(name)
            .and_then(|sv| sv.kind.instance())
            .map(|i| vec![i.to_string()])
            .unwrap_or_default()
    }

    /// stdout and stderr into the consumer's pipe, if the service has one
    fn log_plan(&mut self, name: &str) -> Result<FdPlan> {
        let mut plan = FdPlan::new();
        if let Some(target) = self.services.get(name).and_then(|sv| sv.log_target.clone()) {
            let write = self.logs.pipe(&target)?.write;
            plan.set(1, FdSource::Fd(write)).set(2, FdSource::Fd(write));
        }
        Ok(plan)
    }

    fn spawn_script(&self, name: &str, file: &str, args: &[String], plan: &FdPlan) -> Result<Pid> {
        let dir = match self.services.get(name) {
            Some(sv) => sv.path.clone(),
            None => {
                return Err(Error::UnknownService {
                    name: name.to_string(),
                })
            }
        };
        let sock = self.ctx.sock.to_string_lossy().to_string();
        let pid = spawn::spawn(
            &dir.join(file),
            args,
            &dir,
            plan,
            &[(NITRO_SOCK_ENV, sock.as_str())],
        )?;
        log::debug!("{}: spawned {} as {}", name, file, pid);
        Ok(pid)
    }

    /// Begin the startup sequence from a settled or delayed state.
    pub(crate) fn start(&mut self, name: &str) {
        match self.services.get_mut(name) {
            Some(sv) if !sv.kind.is_template() && sv.kind != Kind::Sys => sv.deadline = None,
            _ => return,
        }
        self.refresh(name);
        self.ensure_consumer(name);
        let has_setup = self
            .services
            .get(name)
            .map_or(false, |sv| sv.has_script("setup"));
        if has_setup {
            self.run_setup(name);
        } else {
            self.launch_run(name);
        }
    }

    fn run_setup(&mut self, name: &str) {
        let args = self.instance_args(name);
        let spawned = self
            .log_plan(name)
            .and_then(|plan| self.spawn_script(name, "setup", &args, &plan));
        match spawned {
            Ok(pid) => {
                if let Some(sv) = self.services.get_mut(name) {
                    sv.helper = Some((pid, Script::Setup));
                }
                self.set_state(name, ServiceState::Setup);
            }
            Err(e) => {
                log::warn!("{}: {}", name, e);
                self.set_state(name, ServiceState::Fatal);
            }
        }
    }

    fn launch_run(&mut self, name: &str) {
        let args = self.instance_args(name);
        let mut plan = match self.log_plan(name) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("{}: {}", name, e);
                self.set_state(name, ServiceState::Fatal);
                return;
            }
        };
        if self.is_consumer(name) {
            match self.logs.pipe(name) {
                Ok(p) => {
                    plan.set(0, FdSource::Fd(p.read));
                }
                Err(e) => log::warn!("{}: no log input: {}", name, e),
            }
        }

        let readiness = self
            .services
            .get(name)
            .map_or(Readiness::Default, |sv| sv.readiness);
        let mut ready = None;
        if let Readiness::Pipe(target) = readiness {
            match basic::fd::pipe_cloexec() {
                Ok((r, w)) => {
                    if let Err(e) = basic::fd::fd_nonblock(r, true) {
                        log::warn!("{}: readiness pipe: {}", name, e);
                    }
                    plan.set(target, FdSource::Fd(w));
                    ready = Some((r, w));
                }
                Err(e) => log::warn!("{}: cannot create readiness pipe: {}", name, e),
            }
        }

        let spawned = self.spawn_script(name, "run", &args, &plan);
        if let Some((_, w)) = ready {
            basic::fd::close(w);
        }
        let pid = match spawned {
            Ok(pid) => pid,
            Err(e) => {
                log::warn!("{}: {}", name, e);
                if let Some((r, _)) = ready {
                    basic::fd::close(r);
                }
                self.set_state(name, ServiceState::Fatal);
                return;
            }
        };

        if let Some(sv) = self.services.get_mut(name) {
            sv.pid = Some(pid);
            sv.spawned = Some(Instant::now());
        }
        self.set_state(name, ServiceState::Starting);
        match (readiness, ready) {
            (Readiness::Explicit, _) => {}
            (Readiness::Pipe(_), Some((r, _))) => self.watch_ready_pipe(name, r),
            _ => {
                let grace = self.ctx.config.ready_timeout();
                self.set_deadline(name, grace, Deadline::Ready);
            }
        }
    }

    fn watch_ready_pipe(&mut self, name: &str, fd: std::os::unix::io::RawFd) {
        let pipe = Rc::new(ReadyPipe::new(name, fd, self.ctx.owner.clone()));
        let source: Rc<dyn Source> = pipe.clone();
        let registered = self
            .ctx
            .event
            .add_source(source.clone())
            .and_then(|_| self.ctx.event.set_enabled(source, EventState::On));
        if let Err(e) = registered {
            log::warn!("{}: cannot watch readiness pipe: {}", name, e);
        }
        if let Some(sv) = self.services.get_mut(name) {
            sv.ready_pipe = Some(pipe);
        }
    }

    fn drop_ready_pipe(&mut self, name: &str) {
        let pipe = match self.services.get_mut(name).and_then(|sv| sv.ready_pipe.take()) {
            Some(p) => p,
            None => return,
        };
        let source: Rc<dyn Source> = pipe;
        if let Err(e) = self.ctx.event.del_source(source) {
            log::debug!("{}: {}", name, e);
        }
    }

    /// STARTING -> UP
    pub(crate) fn mark_ready(&mut self, name: &str) {
        if self.state_of(name) != Some(ServiceState::Starting) {
            return;
        }
        self.drop_ready_pipe(name);
        self.clear_deadline(name);
        self.set_state(name, ServiceState::Up);
    }

    /// A byte or EOF on the readiness pipe registered under `fd`.
    pub(crate) fn ready_notified(&mut self, name: &str, fd: std::os::unix::io::RawFd, ready: bool) {
        let current = self
            .services
            .get(name)
            .and_then(|sv| sv.ready_pipe.as_ref())
            .map_or(false, |p| p.fd() == fd);
        if !current {
            return;
        }
        if ready {
            self.mark_ready(name);
        } else {
            log::info!("{} closed its readiness pipe without reporting", name);
            self.drop_ready_pipe(name);
        }
    }

    pub(crate) fn child_exited(&mut self, pid: Pid, exit: ChildExit) {
        self.reaps += 1;
        let status = match exit {
            ChildExit::Exited(code) => ExitStatus::Exited(code),
            ChildExit::Signaled(sig) => ExitStatus::Signaled(sig),
        };

        let owner = self.services.values().find_map(|sv| {
            if sv.pid == Some(pid) {
                Some((sv.name.clone(), None))
            } else {
                match sv.helper {
                    Some((hp, script)) if hp == pid => Some((sv.name.clone(), Some(script))),
                    _ => None,
                }
            }
        });
        let (name, script) = match owner {
            Some(o) => o,
            None => {
                log::debug!("reaped orphan {}", pid);
                return;
            }
        };

        self.service_reaps += 1;
        if let Some(sv) = self.services.get_mut(&name) {
            sv.reaps += 1;
        }
        match script {
            None => self.run_exited(&name, status),
            Some(script) => self.helper_exited(&name, script, status),
        }
    }

    fn run_exited(&mut self, name: &str, status: ExitStatus) {
        let state = match self.services.get_mut(name) {
            Some(sv) => {
                sv.pid = None;
                sv.last_exit = status;
                sv.deadline = None;
                sv.state
            }
            None => return,
        };
        self.drop_ready_pipe(name);
        match state {
            ServiceState::Starting | ServiceState::Up => {
                log::info!("{} exited unexpectedly: {:?}", name, status);
                self.set_state(name, ServiceState::Restart);
                self.set_state(name, ServiceState::Shutdown);
            }
            ServiceState::Restart => self.set_state(name, ServiceState::Shutdown),
            _ => {}
        }
        self.begin_finish(name);
    }

    fn begin_finish(&mut self, name: &str) {
        let last = match self.services.get(name) {
            Some(sv) if sv.has_script("finish") => sv.last_exit,
            Some(_) => return self.settle(name),
            None => return,
        };
        let (code, sig) = last.finish_args();
        let spawned = self
            .log_plan(name)
            .and_then(|plan| self.spawn_script(name, "finish", &[code, sig], &plan));
        match spawned {
            Ok(pid) => {
                if let Some(sv) = self.services.get_mut(name) {
                    sv.helper = Some((pid, Script::Finish));
                }
                let timeout = self.ctx.config.kill_timeout();
                self.set_deadline(name, timeout, Deadline::Kill);
            }
            Err(e) => {
                log::warn!("{}: {}", name, e);
                self.settle(name);
            }
        }
    }

    fn helper_exited(&mut self, name: &str, script: Script, status: ExitStatus) {
        let (kind, state) = match self.services.get_mut(name) {
            Some(sv) => {
                sv.helper = None;
                sv.deadline = None;
                sv.last_exit = status;
                (sv.kind.clone(), sv.state)
            }
            None => return,
        };
        log::debug!("{}: {} exited: {:?}", name, script.file(), status);

        if kind == Kind::Sys {
            self.set_state(name, ServiceState::Down);
            return;
        }
        match (script, state) {
            (Script::Setup, ServiceState::Setup) => match status {
                ExitStatus::Exited(0) => {
                    let has_run = self
                        .services
                        .get(name)
                        .map_or(false, |sv| sv.has_script("run"));
                    if has_run {
                        self.launch_run(name);
                    } else {
                        self.set_state(name, ServiceState::Oneshot);
                    }
                }
                ExitStatus::Exited(EXIT_FATAL) => {
                    log::warn!("{}: setup failed fatally", name);
                    self.set_state(name, ServiceState::Fatal);
                }
                _ => {
                    log::info!("{}: setup failed, retrying", name);
                    let retry = self.ctx.config.setup_retry();
                    self.set_deadline(name, retry, Deadline::SetupRetry);
                }
            },
            _ => self.settle(name),
        }
    }

    /// After the last process of a run is gone: start over, wait in DELAY
    /// or come to rest at DOWN.
    fn settle(&mut self, name: &str) {
        let may_start = self.phase.may_start();
        let min_uptime = self.ctx.config.min_uptime();
        let (restart, short) = match self.services.get_mut(name) {
            Some(sv) => {
                let spawned = sv.spawned.take();
                let fast = std::mem::take(&mut sv.fast);
                let short = !fast && spawned.map_or(false, |t| t.elapsed() < min_uptime);
                (sv.wanted == Wanted::Up && may_start, short)
            }
            None => return,
        };
        if !restart {
            self.set_state(name, ServiceState::Down);
        } else if short {
            let delay = self.ctx.config.restart_delay();
            self.set_deadline(name, delay, Deadline::Delay);
            self.set_state(name, ServiceState::Delay);
        } else {
            self.start(name);
        }
    }

    fn kill(&mut self, name: &str, target: Option<Pid>, sig: Signal) {
        if let Some(pid) = target {
            if let Err(e) = kill_and_cont(pid, sig) {
                log::debug!("{}: kill {} {}: {}", name, pid, sig, e);
            }
            let timeout = self.ctx.config.kill_timeout();
            self.set_deadline(name, timeout, Deadline::Kill);
        }
    }

    /// Bring a service to rest without touching `wanted`.
    fn terminate(&mut self, name: &str, sig: Signal) {
        let (state, pid, helper) = match self.services.get(name) {
            Some(sv) => (sv.state, sv.pid, sv.helper),
            None => return,
        };
        match state {
            ServiceState::Starting | ServiceState::Up | ServiceState::Restart => {
                self.kill(name, pid, sig);
                self.set_state(name, ServiceState::Shutdown);
            }
            ServiceState::Setup => match helper {
                Some((hp, _)) => {
                    self.kill(name, Some(hp), sig);
                    self.set_state(name, ServiceState::Shutdown);
                }
                None => {
                    self.clear_deadline(name);
                    self.set_state(name, ServiceState::Down);
                }
            },
            ServiceState::Oneshot => {
                self.set_state(name, ServiceState::Shutdown);
                self.begin_finish(name);
            }
            ServiceState::Delay => {
                self.clear_deadline(name);
                self.set_state(name, ServiceState::Down);
            }
            ServiceState::Shutdown | ServiceState::Down | ServiceState::Fatal => {}
        }
    }

    /// down and hup
    pub(crate) fn down(&mut self, name: &str, sig: Signal) -> Result<()> {
        if name == SYS_SERVICE {
            return Err(Error::Refused {
                name: name.to_string(),
                msg: "controlled by Shutdown and Reboot".to_string(),
            });
        }
        let (was_up, state) = match self.services.get_mut(name) {
            Some(sv) => {
                let was_up = sv.wanted == Wanted::Up;
                sv.wanted = Wanted::Down;
                (was_up, sv.state)
            }
            None => return self.unknown(name),
        };
        match state {
            ServiceState::Down if was_up => self.set_state(name, ServiceState::Down),
            ServiceState::Down => {}
            ServiceState::Fatal => self.set_state(name, ServiceState::Down),
            _ => self.terminate(name, sig),
        }
        Ok(())
    }

    pub(crate) fn up(&mut self, name: &str) -> Result<()> {
        if !self.phase.may_start() {
            return Err(Error::Refused {
                name: name.to_string(),
                msg: "shutting down".to_string(),
            });
        }
        self.ensure_instance(name, Wanted::Up)?;
        let state = match self.services.get_mut(name) {
            Some(sv) => {
                sv.wanted = Wanted::Up;
                sv.state
            }
            None => return self.unknown(name),
        };
        if state == ServiceState::Down {
            self.start(name);
        }
        Ok(())
    }

    pub(crate) fn restart(&mut self, name: &str, fast: bool) -> Result<()> {
        if !self.phase.may_start() {
            return Err(Error::Refused {
                name: name.to_string(),
                msg: "shutting down".to_string(),
            });
        }
        self.ensure_instance(name, Wanted::Up)?;
        let (state, pid, helper) = match self.services.get_mut(name) {
            Some(sv) => {
                sv.wanted = Wanted::Up;
                sv.fast = fast;
                (sv.state, sv.pid, sv.helper)
            }
            None => return self.unknown(name),
        };
        match state {
            ServiceState::Starting | ServiceState::Up => {
                self.kill(name, pid, Signal::SIGTERM);
                self.set_state(name, ServiceState::Restart);
            }
            ServiceState::Setup => match helper {
                Some((hp, _)) => {
                    self.kill(name, Some(hp), Signal::SIGTERM);
                    self.set_state(name, ServiceState::Restart);
                }
                None => self.start(name),
            },
            ServiceState::Oneshot => {
                self.set_state(name, ServiceState::Restart);
                self.set_state(name, ServiceState::Shutdown);
                self.begin_finish(name);
            }
            ServiceState::Restart | ServiceState::Shutdown => {}
            ServiceState::Down | ServiceState::Fatal | ServiceState::Delay => self.start(name),
        }
        Ok(())
    }

    /// deliver `sig` to the run process only
    pub(crate) fn signal(&mut self, name: &str, sig: Signal) -> Result<()> {
        match self.services.get(name).map(|sv| sv.pid) {
            Some(Some(pid)) => signal::kill(pid, sig).context(NixSnafu),
            Some(None) => Err(Error::Refused {
                name: name.to_string(),
                msg: "not running".to_string(),
            }),
            None => self.unknown(name),
        }
    }

    fn unknown(&self, name: &str) -> Result<()> {
        Err(Error::UnknownService {
            name: name.to_string(),
        })
    }

    /// Act on every deadline that has passed.
    pub(crate) fn deadlines_due(&mut self) {
        let now = Instant::now();
        let due: Vec<(String, Deadline)> = self
            .services
            .values()
            .filter_map(|sv| match sv.deadline {
                Some((at, what)) if at <= now => Some((sv.name.clone(), what)),
                _ => None,
            })
            .collect();

        for (name, what) in due {
            let (state, pid, helper) = match self.services.get_mut(&name) {
                Some(sv) => {
                    sv.deadline = None;
                    (sv.state, sv.pid, sv.helper)
                }
                None => continue,
            };
            match what {
                Deadline::Ready => self.mark_ready(&name),
                Deadline::SetupRetry if state == ServiceState::Setup && helper.is_none() => {
                    self.run_setup(&name)
                }
                Deadline::Delay if state == ServiceState::Delay => self.start(&name),
                Deadline::Kill => {
                    if let Some(target) = pid.or_else(|| helper.map(|(hp, _)| hp)) {
                        log::warn!("{}: {} did not stop in time, killing", name, target);
                        if let Err(e) = signal::kill(target, Signal::SIGKILL) {
                            log::debug!("{}: {}", name, e);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Sync the registry with the directory tree.
    pub(crate) fn rescan(&mut self) -> Result<()> {
        let entries = scan::scan(&self.ctx.root)?;
        let mut seen = HashSet::new();
        for entry in entries {
            seen.insert(entry.name.clone());
            if let Some(sv) = self.services.get_mut(&entry.name) {
                sv.anchored = true;
                sv.path = entry.path;
                continue;
            }

            let runnable = matches!(entry.kind, Kind::Plain | Kind::Instance { .. });
            let wanted = match runnable && !entry.down {
                true => Wanted::Up,
                false => Wanted::Down,
            };
            log::debug!("adding service {}", entry.name);
            self.services.insert(
                entry.name.clone(),
                Service::new(&entry.name, entry.path, entry.kind, wanted),
            );
            if !runnable {
                continue;
            }
            if entry.down {
                self.set_state(&entry.name, ServiceState::Down);
            } else if self.phase == Phase::Running {
                self.start(&entry.name);
            }
        }

        let gone: Vec<String> = self
            .services
            .keys()
            .filter(|n| !seen.contains(*n))
            .cloned()
            .collect();
        for name in gone {
            let (idle, template_alive) = match self.services.get_mut(&name) {
                Some(sv) => {
                    let alive = match &sv.kind {
                        Kind::Instance { template, .. } => seen.contains(template),
                        _ => false,
                    };
                    (sv.is_idle(), alive)
                }
                None => continue,
            };
            if idle {
                log::debug!("removing service {}", name);
                self.services.remove(&name);
            } else if template_alive {
                if let Some(sv) = self.services.get_mut(&name) {
                    sv.anchored = false;
                }
            } else {
                log::info!("directory of {} vanished, stopping it", name);
                if let Some(sv) = self.services.get_mut(&name) {
                    sv.anchored = false;
                    sv.wanted = Wanted::Down;
                }
                self.terminate(&name, Signal::SIGTERM);
            }
        }

        // a live service keeps its log target and readiness until it restarts
        let idle: Vec<String> = self
            .services
            .values()
            .filter(|sv| matches!(sv.kind, Kind::Plain | Kind::Instance { .. }) && sv.is_idle())
            .map(|sv| sv.name.clone())
            .collect();
        for name in idle {
            self.refresh(&name);
        }
        Ok(())
    }

    /// Enter Booting, with SYS setup if there is one.
    pub(crate) fn boot(&mut self) {
        self.phase = Phase::Booting;
        self.sys_finish_started = false;
        let has_setup = self
            .services
            .get(SYS_SERVICE)
            .map_or(false, |sv| sv.has_script("setup"));
        if has_setup {
            log::info!("running SYS setup");
            self.run_setup(SYS_SERVICE);
        }
    }

    /// Start going down, unless that is already underway.
    pub(crate) fn begin_shutdown(&mut self, reason: Reason) {
        match self.phase {
            Phase::Booting | Phase::Running => {
                log::info!("{} requested", reason);
                self.phase = Phase::Finishing(reason);
            }
            _ => log::debug!("{} requested while already going down", reason),
        }
    }

    fn sys_busy(&self) -> bool {
        self.services
            .get(SYS_SERVICE)
            .map_or(false, |sv| sv.helper.is_some())
    }

    fn run_sys_finish(&mut self, reason: Reason) {
        let last = match self.services.get(SYS_SERVICE) {
            Some(sv) if sv.has_script("finish") => sv.last_exit,
            _ => return,
        };
        let (code, sig) = last.finish_args();
        let args = [code, sig, reason.to_string()];
        match self.spawn_script(SYS_SERVICE, "finish", &args, &FdPlan::new()) {
            Ok(pid) => {
                log::info!("running SYS finish");
                if let Some(sv) = self.services.get_mut(SYS_SERVICE) {
                    sv.helper = Some((pid, Script::Finish));
                }
                self.set_state(SYS_SERVICE, ServiceState::Shutdown);
            }
            Err(e) => log::warn!("{}: {}", SYS_SERVICE, e),
        }
    }

    fn runnable_names(&self) -> Vec<String> {
        self.services
            .values()
            .filter(|sv| matches!(sv.kind, Kind::Plain | Kind::Instance { .. }))
            .map(|sv| sv.name.clone())
            .collect()
    }

    /// Move the global lifecycle forward as far as it goes. Returns true
    /// when the phase changed.
    pub(crate) fn advance_phase(&mut self) -> bool {
        let phase = self.phase;
        match phase {
            Phase::Booting if !self.sys_busy() => {
                log::info!("boot complete");
                self.phase = Phase::Running;
                for name in self.runnable_names() {
                    let startable = self.services.get(&name).map_or(false, |sv| {
                        sv.wanted == Wanted::Up && sv.state == ServiceState::Down
                    });
                    if startable {
                        self.start(&name);
                    }
                }
                true
            }
            Phase::Finishing(reason) if !self.sys_busy() => {
                if !self.sys_finish_started {
                    self.sys_finish_started = true;
                    self.run_sys_finish(reason);
                } else {
                    log::info!("stopping all services");
                    self.phase = Phase::Stopping(reason);
                    for name in self.runnable_names() {
                        self.terminate(&name, Signal::SIGTERM);
                    }
                }
                true
            }
            Phase::Stopping(reason)
                if self
                    .services
                    .values()
                    .all(|sv| sv.pid.is_none() && sv.helper.is_none()) =>
            {
                log::info!("all services stopped");
                self.phase = Phase::Done(reason);
                true
            }
            Phase::Done(Reason::Reboot) if !self.ctx.pid1 => {
                // the log daemon went down with everything else
                log::reinit();
                log::info!("restarting the boot sequence");
                if let Err(e) = self.reset() {
                    log::error!("failed to rescan {:?}: {}", self.ctx.root, e);
                }
                self.boot();
                true
            }
            _ => false,
        }
    }

    /// wanted back to what the directory says, then rescan
    fn reset(&mut self) -> Result<()> {
        self.phase = Phase::Booting;
        for sv in self.services.values_mut() {
            let up = sv.anchored && !sv.path.join("down").exists();
            sv.wanted = match (&sv.kind, up) {
                (Kind::Plain, true) | (Kind::Instance { .. }, true) => Wanted::Up,
                _ => Wanted::Down,
            };
        }
        self.rescan()
    }

    /// log pipes whose consumer is idle and unreferenced by a live producer
    pub(crate) fn collect_log_pipes(&mut self) {
        let services = &self.services;
        self.logs.gc(|consumer| {
            let consumer_live = services.get(consumer).map_or(false, |sv| !sv.is_idle());
            consumer_live
                || services
                    .values()
                    .any(|sv| !sv.is_idle() && sv.log_target.as_deref() == Some(consumer))
        });
    }

    pub(crate) fn service_count(&self) -> usize {
        self.services
            .values()
            .filter(|sv| matches!(sv.kind, Kind::Plain | Kind::Instance { .. }))
            .count()
    }

    /// `list` output, SYS and templates are not shown
    pub(crate) fn list(&self) -> String {
        self.services
            .values()
            .filter(|sv| matches!(sv.kind, Kind::Plain | Kind::Instance { .. }))
            .map(|sv| sv.list_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
