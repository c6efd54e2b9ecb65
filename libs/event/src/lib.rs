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

//! # Single threaded epoll loop for the supervisor
//!
//! Io sources are watched on their own fd. Signal sources share one
//! signalfd, Timer sources share one monotonic timerfd, and Defer sources
//! run on every pass while they stay On.
//!
//! ```rust
//! # use std::{io::Write, os::unix::io::{AsRawFd, RawFd}, os::unix::net::UnixStream, rc::Rc};
//! # use event::{EventState, EventType, Events, Source};
//! struct Io {
//!     t: UnixStream,
//! }
//!
//! impl Source for Io {
//!     fn fd(&self) -> RawFd {
//!         self.t.as_raw_fd()
//!     }
//!
//!     fn event_type(&self) -> EventType {
//!         EventType::Io
//!     }
//!
//!     fn priority(&self) -> i8 {
//!         0i8
//!     }
//!
//!     fn dispatch(&self, e: &Events) -> i32 {
//!         e.set_exit();
//!         0
//!     }
//!
//!     fn token(&self) -> u64 {
//!         let data: u64 = unsafe { std::mem::transmute(self) };
//!         data
//!     }
//! }
//!
//! let (a, mut b) = UnixStream::pair().unwrap();
//! let e = Events::new().unwrap();
//! let s: Rc<dyn Source> = Rc::new(Io { t: a });
//! e.add_source(s.clone()).unwrap();
//! e.set_enabled(s.clone(), EventState::OneShot).unwrap();
//! b.write_all(b"x").unwrap();
//! e.rloop().unwrap();
//! e.del_source(s).unwrap();
//! ```
pub mod error;
pub mod events;
mod poll;
pub mod source;
mod timer;

pub use crate::events::Events;
pub use crate::source::Source;
pub use error::*;

/// What a source waits for
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum EventType {
    /// readiness of the source's fd
    Io,
    /// one of the source's signals
    Signal,
    /// monotonic deadline, time_relative() after enabling
    Timer,
    /// nothing, runs once per pass while On
    Defer,
}

/// The dispatch status of the event
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum EventState {
    /// dispatch whenever ready
    On,
    /// not watched
    Off,
    /// dispatch once then switch Off
    OneShot,
}
