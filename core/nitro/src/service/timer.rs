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

//! One monotonic timer carrying the earliest service deadline
use crate::service::ServiceManager;
use event::{EventState, EventType, Events, Source};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

pub(crate) struct DeadlineTimer {
    event: Rc<Events>,
    usec: Cell<u64>,
    armed: Cell<Option<Instant>>,
    manager: RefCell<Weak<ServiceManager>>,
}

impl DeadlineTimer {
    pub(crate) fn new(eventr: &Rc<Events>) -> Rc<DeadlineTimer> {
        let timer = Rc::new(DeadlineTimer {
            event: Rc::clone(eventr),
            usec: Cell::new(0),
            armed: Cell::new(None),
            manager: RefCell::new(Weak::new()),
        });
        let source: Rc<dyn Source> = timer.clone();
        if let Err(e) = eventr.add_source(source) {
            log::error!("failed to register the deadline timer: {}", e);
        }
        timer
    }

    pub(crate) fn set_manager(&self, manager: &Rc<ServiceManager>) {
        self.manager.replace(Rc::downgrade(manager));
    }

    /// fire at `deadline`, or never
    pub(crate) fn arm(self: &Rc<Self>, deadline: Option<Instant>) {
        if self.armed.get() == deadline {
            return;
        }
        let source: Rc<dyn Source> = self.clone();
        if let Err(e) = self.event.set_enabled(source.clone(), EventState::Off) {
            log::error!("failed to disarm the deadline timer: {}", e);
        }
        self.armed.set(deadline);
        let deadline = match deadline {
            None => return,
            Some(d) => d,
        };
        self.usec.set(basic::time::usec_until(deadline).max(1));
        if let Err(e) = self.event.set_enabled(source, EventState::OneShot) {
            log::error!("failed to arm the deadline timer: {}", e);
        }
    }
}

impl Source for DeadlineTimer {
    fn event_type(&self) -> EventType {
        EventType::Timer
    }

    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN) as u32
    }

    fn priority(&self) -> i8 {
        0i8
    }

    fn time_relative(&self) -> u64 {
        self.usec.get()
    }

    fn dispatch(&self, _e: &Events) -> i32 {
        self.armed.set(None);
        if let Some(manager) = self.manager.borrow().upgrade() {
            manager.deadlines_due();
        }
        0
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }

    fn description(&self) -> String {
        String::from("service deadlines")
    }
}
