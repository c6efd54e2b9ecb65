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

//! The daemon around the service manager: control socket, signals and the
//! main loop.
pub(crate) mod commands;
pub(crate) mod config;
pub(crate) mod signals;

use crate::error::*;
use crate::service::{Phase, Reason, ServiceManager};
use cmdproto::proto::execute::{ExecuterAction, WaitCondition};
use cmdproto::proto::CommandResponse;
use commands::Commands;
use config::NitroConfig;
use event::{EventState, Events, Source};
use nix::sys::reboot::{self, RebootMode};
use nix::sys::signal::Signal;
use nix::sys::signalfd::siginfo;
use nix::sys::socket::UnixCredentials;
use nix::unistd::{self, Pid};
use signals::{SignalDispatcher, Signals};
use std::os::unix::io::RawFd;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// how long remaining processes get between SIGTERM and SIGKILL at the end
const FINAL_KILL_TIMEOUT: Duration = Duration::from_secs(10);

fn is_pid1() -> bool {
    unistd::getpid() == Pid::from_raw(1)
}

struct SignalMgr {
    sm: Rc<ServiceManager>,
}

impl SignalMgr {
    fn new(sm: Rc<ServiceManager>) -> Self {
        SignalMgr { sm }
    }
}

impl SignalDispatcher for SignalMgr {
    fn dispatch_signal(&self, signal: &siginfo) -> Result<i32> {
        /* Received signal should be in the set defined in EVENT_SIGNALS */
        match signal.ssi_signo as libc::c_int {
            libc::SIGHUP => self.sm.rescan().map(|_| 1),
            libc::SIGTERM => {
                self.sm.shutdown(Reason::Shutdown);
                Ok(1)
            }
            libc::SIGCHLD => Ok(self.sm.child_sigchld_enable(true)),
            /* The kernel sends SIGINT to PID 1 on ctrl-alt-del */
            libc::SIGINT => {
                let reason = match is_pid1() {
                    true => Reason::Reboot,
                    false => Reason::Shutdown,
                };
                self.sm.shutdown(reason);
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

struct CommandActionMgr {
    sm: Rc<ServiceManager>,
}

impl CommandActionMgr {
    fn new(sm: Rc<ServiceManager>) -> Self {
        CommandActionMgr { sm }
    }
}

impl ExecuterAction for CommandActionMgr {
    type Error = Error;

    fn resolve(&self, name: &str, create: bool) -> Result<String> {
        self.sm.resolve(name, create)
    }

    fn up(&self, name: &str) -> Result<()> {
        self.sm.up(name)
    }

    fn down(&self, name: &str) -> Result<()> {
        self.sm.down(name, Signal::SIGTERM)
    }

    fn hup(&self, name: &str) -> Result<()> {
        self.sm.down(name, Signal::SIGHUP)
    }

    fn restart(&self, name: &str, fast: bool) -> Result<()> {
        self.sm.restart(name, fast)
    }

    fn signal(&self, name: &str, signal: i32) -> Result<()> {
        self.sm.signal(name, signal)
    }

    fn pidof(&self, name: &str) -> Option<i32> {
        self.sm.pidof(name)
    }

    fn check(&self, name: &str) -> bool {
        self.sm.check(name)
    }

    fn ready(&self, name: &str, cred: Option<UnixCredentials>) -> Result<()> {
        self.sm.ready(name, cred)
    }

    fn wait(
        &self,
        cond: WaitCondition,
        names: Vec<String>,
        client: RawFd,
    ) -> Result<Option<CommandResponse>> {
        self.sm.wait(cond, names, client)
    }

    fn rescan(&self) -> Result<()> {
        self.sm.rescan()
    }

    fn list(&self) -> String {
        self.sm.list()
    }

    fn info(&self) -> String {
        self.sm.info()
    }

    fn shutdown(&self) -> Result<()> {
        self.sm.shutdown(Reason::Shutdown);
        Ok(())
    }

    fn reboot(&self) -> Result<()> {
        self.sm.shutdown(Reason::Reboot);
        Ok(())
    }
}

/// Encapsulate manager and expose api to the outside
pub struct Manager {
    event: Rc<Events>,
    commands: Rc<Commands<CommandActionMgr>>,
    signal: Rc<Signals<SignalMgr>>,
    sm: Rc<ServiceManager>,
}

impl Drop for Manager {
    fn drop(&mut self) {
        log::debug!("Manager drop, clear.");
        self.event.clear();
    }
}

impl Manager {
    /// create the manager supervising `root`, controlled through `sock`
    pub fn new(config: Rc<NitroConfig>, root: &Path, sock: &Path) -> Result<Self> {
        let event = Rc::new(Events::new().context(EventSnafu)?);
        let sm = ServiceManager::new(&event, config, root, sock);
        let commands = Rc::new(Commands::new(sock, CommandActionMgr::new(Rc::clone(&sm)))?);
        Ok(Manager {
            signal: Rc::new(Signals::new(SignalMgr::new(Rc::clone(&sm)))),
            event,
            commands,
            sm,
        })
    }

    /// register the event sources and boot
    pub fn startup(&self) -> Result<()> {
        self.register_ex()?;
        log::info!("supervising {:?}", self.sm.root());
        self.sm.boot()
    }

    /// run until shutdown, returning the reason
    pub fn main_loop(&self) -> Result<Reason> {
        loop {
            if let Err(e) = self.event.rloop() {
                log::error!("event run loop error is: {}", e);
            }
            match self.sm.phase() {
                Phase::Done(reason) => return Ok(reason),
                phase => log::warn!("event loop left in phase {:?}, resuming", phase),
            }
        }
    }

    /// Bring the machine down after the last service stopped.
    pub fn finish_system(reason: Reason) {
        if !is_pid1() {
            return;
        }
        let mut pids = basic::process::kill_all_pids(Signal::SIGTERM);
        pids = basic::process::wait_pids(pids, FINAL_KILL_TIMEOUT);
        if !pids.is_empty() {
            pids = basic::process::kill_all_pids(Signal::SIGKILL);
            basic::process::wait_pids(pids, FINAL_KILL_TIMEOUT);
        }
        unistd::sync();
        let mode = match reason {
            Reason::Shutdown => RebootMode::RB_POWER_OFF,
            Reason::Reboot => RebootMode::RB_AUTOBOOT,
        };
        log::info!("{}: {:?}", reason, mode);
        log::flush!();
        let _ = reboot::reboot(mode);
    }

    fn register_ex(&self) -> Result<()> {
        // cmd
        let cmd: Rc<dyn Source> = self.commands.clone();
        self.event.add_source(cmd.clone()).context(EventSnafu)?;
        self.event
            .set_enabled(cmd, EventState::On)
            .context(EventSnafu)?;
        // signal
        let signal: Rc<dyn Source> = self.signal.clone();
        self.event.add_source(signal.clone()).context(EventSnafu)?;
        self.event
            .set_enabled(signal, EventState::On)
            .context(EventSnafu)?;
        // children that exited before the signal source existed
        self.sm.child_sigchld_enable(true);
        Ok(())
    }
}
