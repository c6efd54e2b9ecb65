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

//! A control client blocked on `start`, `stop`, `wait-up` or `wait-down`
use crate::service::ServiceManager;
use cmdproto::proto::execute::WaitCondition;
use event::{EventType, Events, Source};
use std::cell::Cell;
use std::os::unix::io::RawFd;
use std::rc::Weak;

pub(crate) struct PendingWait {
    pub(crate) cond: WaitCondition,
    pub(crate) names: Vec<String>,
    client: Cell<RawFd>,
    manager: Weak<ServiceManager>,
}

impl PendingWait {
    pub(crate) fn new(
        cond: WaitCondition,
        names: Vec<String>,
        client: RawFd,
        manager: Weak<ServiceManager>,
    ) -> Self {
        PendingWait {
            cond,
            names,
            client: Cell::new(client),
            manager,
        }
    }

    pub(crate) fn client(&self) -> RawFd {
        self.client.get()
    }

    /// Hand the connection back, dropping the wait no longer closes it.
    pub(crate) fn disown(&self) -> RawFd {
        self.client.replace(-1)
    }
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        let fd = self.client.get();
        if fd >= 0 {
            basic::fd::close(fd);
        }
    }
}

impl Source for PendingWait {
    fn fd(&self) -> RawFd {
        self.client.get()
    }

    fn event_type(&self) -> EventType {
        EventType::Io
    }

    // the client sends nothing after its request, any wakeup means it left
    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLHUP) as u32
    }

    fn priority(&self) -> i8 {
        0i8
    }

    fn dispatch(&self, _e: &Events) -> i32 {
        if let Some(manager) = self.manager.upgrade() {
            manager.cancel_wait(self.client.get());
        }
        0
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }

    fn description(&self) -> String {
        format!("{:?} wait on {}", self.cond, self.names.join(" "))
    }
}
