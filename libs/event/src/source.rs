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

//! The Source trait every registered event implements
use crate::EventType;
use crate::Events;
use nix::sys::signal::Signal;
use std::fmt::Debug;
use std::os::unix::io::RawFd;

/// Something the loop watches and calls back into
pub trait Source {
    /// descriptor watched by Io sources
    fn fd(&self) -> RawFd {
        -1
    }

    /// signals routed through the shared signalfd by Signal sources
    fn signals(&self) -> Vec<Signal> {
        vec![]
    }

    /// Timer sources fire this many microseconds after being enabled.
    /// `u64::MAX` never fires.
    fn time_relative(&self) -> u64 {
        u64::MAX
    }

    /// kind of source
    fn event_type(&self) -> EventType {
        EventType::Io
    }

    /// epoll mask for Io and Signal sources
    fn epoll_event(&self) -> u32 {
        libc::EPOLLIN as u32
    }

    /// Identifies the source inside the loop, unique while it is added.
    /// The address of `self` is the usual choice:
    /// ```ignore
    /// fn token(&self) -> u64 {
    ///     let data: u64 = unsafe { std::mem::transmute(self) };
    ///     data
    /// }
    /// ```
    fn token(&self) -> u64;

    /// Smaller runs first among sources ready at the same time
    fn priority(&self) -> i8;

    /// callback
    fn dispatch(&self, event: &Events) -> i32;

    /// name used in debug output
    fn description(&self) -> String {
        String::from("default")
    }
}

impl PartialEq for dyn Source {
    fn eq(&self, other: &dyn Source) -> bool {
        self.token() == other.token()
    }
}

impl Debug for dyn Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Source {{ {} }}", self.description())
    }
}
