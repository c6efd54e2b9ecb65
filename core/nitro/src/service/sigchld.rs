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

//! Reaping, driven by SIGCHLD
use crate::service::ServiceManager;
use event::{EventState, EventType, Events, Source};
use nix::errno::Errno;
use nix::sys::wait::{self, Id, WaitPidFlag, WaitStatus};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// How a child ended, as seen by the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChildExit {
    Exited(i32),
    Signaled(i32),
}

pub(crate) struct Sigchld {
    event: Rc<Events>,
    manager: RefCell<Weak<ServiceManager>>,
    me: RefCell<Weak<Sigchld>>,
}

impl Sigchld {
    pub(crate) fn new(eventr: &Rc<Events>) -> Rc<Sigchld> {
        let sigchld = Rc::new(Sigchld {
            event: Rc::clone(eventr),
            manager: RefCell::new(Weak::new()),
            me: RefCell::new(Weak::new()),
        });
        sigchld.me.replace(Rc::downgrade(&sigchld));
        let source: Rc<dyn Source> = sigchld.clone();
        if let Err(e) = eventr.add_source(source) {
            log::error!("failed to register the child reaper: {}", e);
        }
        sigchld
    }

    pub(crate) fn set_manager(&self, manager: &Rc<ServiceManager>) {
        self.manager.replace(Rc::downgrade(manager));
    }

    pub(crate) fn enable(&self, enable: bool) -> i32 {
        let source: Rc<dyn Source> = match self.me.borrow().upgrade() {
            Some(s) => s,
            None => return -1,
        };
        let state = match enable {
            true => EventState::On,
            false => EventState::Off,
        };
        self.event.set_enabled(source, state).unwrap_or(-1)
    }

    /// Handle one exited child, returns false once there is nothing left
    fn sigchld_dispatch(&self) -> bool {
        // peek, the zombie stays until the state machine saw it
        let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
        let wait_status = match wait::waitid(Id::All, flags) {
            Ok(s) => s,
            Err(err) => {
                if err != Errno::ECHILD {
                    log::error!("Error while waiting pid: {}", err);
                }
                return false;
            }
        };

        let (pid, exit) = match wait_status {
            WaitStatus::Exited(pid, code) => (pid, ChildExit::Exited(code)),
            WaitStatus::Signaled(pid, signal, _dc) => (pid, ChildExit::Signaled(signal as i32)),
            WaitStatus::StillAlive => return false,
            _ => {
                log::debug!("Ignored child signal: {:?}", wait_status);
                return true;
            }
        };
        log::debug!("Process {} exited: {:?}", pid, exit);

        if let Some(manager) = self.manager.borrow().upgrade() {
            manager.child_exited(pid, exit);
        }

        // pop: reap the zombie
        if let Err(e) = wait::waitid(Id::Pid(pid), WaitPidFlag::WEXITED) {
            log::error!("Failed to reap process {}: {}", pid, e);
        }
        true
    }
}

impl Source for Sigchld {
    fn event_type(&self) -> EventType {
        EventType::Defer
    }

    fn epoll_event(&self) -> u32 {
        0
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }

    fn priority(&self) -> i8 {
        -7
    }

    fn dispatch(&self, _event: &Events) -> i32 {
        if !self.sigchld_dispatch() {
            self.enable(false);
        }
        0
    }

    fn description(&self) -> String {
        String::from("sigchld")
    }
}
