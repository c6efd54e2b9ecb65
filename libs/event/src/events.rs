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

//! The loop: sources, the pending queue and the shared signal and timer fds
use crate::error::*;
use crate::poll::Poll;
use crate::timer::{now_usec, Timer};
use crate::{EventState, EventType, Source};
use nix::sys::signalfd::{siginfo, SfdFlags, SigSet, SignalFd};
use nix::sys::time::{TimeSpec, TimeValLike};
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use nix::unistd;
use snafu::ResultExt;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::os::unix::io::AsRawFd;
use std::rc::Rc;

/// epoll token of the timerfd, never a heap address
const TIMER_TOKEN: u64 = u64::MAX;

/// Single threaded event loop. Each [`Events::run`] dispatches at most one
/// source, the one with the smallest priority that became ready first.
#[derive(Debug)]
pub struct Events {
    data: RefCell<Registry>,
}

impl Drop for Events {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Events {
    /// create an empty loop
    pub fn new() -> Result<Events> {
        Ok(Events {
            data: RefCell::new(Registry::new()?),
        })
    }

    /// add a source, initially Off
    pub fn add_source(&self, source: Rc<dyn Source>) -> Result<i32> {
        self.data.borrow_mut().add_source(source);
        Ok(0)
    }

    /// remove a source, dropping anything it still has queued
    pub fn del_source(&self, source: Rc<dyn Source>) -> Result<i32> {
        self.data.borrow_mut().del_source(&source)?;
        Ok(0)
    }

    /// switch a source On, Off or OneShot
    pub fn set_enabled(&self, source: Rc<dyn Source>, state: EventState) -> Result<i32> {
        self.data.borrow_mut().set_enabled(&source, state)?;
        Ok(0)
    }

    /// make [`Events::rloop`] return
    pub fn set_exit(&self) {
        self.data.borrow_mut().exit = true;
    }

    /// whether set_exit() was called
    pub fn is_exited(&self) -> bool {
        self.data.borrow().exit
    }

    /// Wait up to `timeout` milliseconds (-1 forever) and dispatch one source
    pub fn run(&self, timeout: i32) -> Result<i32> {
        if self.is_exited() {
            return Ok(0);
        }

        {
            let mut data = self.data.borrow_mut();
            data.arm_timer()?;
            let timeout = if data.pending.is_empty() { timeout } else { 0 };
            data.wait(timeout)?;
        }

        self.dispatch_one()?;
        Ok(0)
    }

    /// run until set_exit()
    pub fn rloop(&self) -> Result<i32> {
        while !self.is_exited() {
            self.run(-1)?;
        }
        Ok(0)
    }

    fn dispatch_one(&self) -> Result<()> {
        let top = match self.data.borrow_mut().pending_pop() {
            None => return Ok(()),
            Some(top) => top,
        };

        let state = match self.data.borrow().state.get(&top.token()) {
            None => return Ok(()),
            Some(s) => s.state.clone(),
        };

        match state {
            EventState::Off => {}
            EventState::On => {
                top.dispatch(self);
                // defers stay queued until switched off
                let mut data = self.data.borrow_mut();
                let still_on = data
                    .state
                    .get(&top.token())
                    .map_or(false, |s| s.state == EventState::On);
                if still_on && top.event_type() == EventType::Defer {
                    data.pending_push(top.clone());
                }
            }
            EventState::OneShot => {
                self.data
                    .borrow_mut()
                    .set_enabled(&top, EventState::Off)?;
                top.dispatch(self);
            }
        }
        Ok(())
    }

    /// fetch one pending signal for a Signal source being dispatched
    pub fn read_signals(&self) -> Option<siginfo> {
        self.data.borrow_mut().signalfd.read_signal().unwrap_or(None)
    }

    /// release every source, safe to call more than once
    pub fn clear(&self) {
        self.data.borrow_mut().clear();
    }
}

#[derive(Debug)]
struct State {
    state: EventState,
    queued: bool,
}

/// A ready source. Smaller priority first, then first come first served.
#[derive(Debug)]
struct Pending {
    priority: i8,
    seq: u64,
    source: Rc<dyn Source>,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Pending {}

#[derive(Debug)]
struct Registry {
    poll: Poll,
    exit: bool,
    sources: HashMap<u64, Rc<dyn Source>>,
    state: HashMap<u64, State>,
    pending: BinaryHeap<Pending>,
    seq: u64,
    timer: Timer,
    timerfd: TimerFd,
    armed: Option<u64>,
    signalfd: SignalFd,
}

impl Registry {
    fn new() -> Result<Registry> {
        let mut poll = Poll::new()?;
        let timerfd = TimerFd::new(
            ClockId::CLOCK_MONOTONIC,
            TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC,
        )
        .context(NixSnafu)?;
        poll.register(timerfd.as_raw_fd(), libc::EPOLLIN as u32, TIMER_TOKEN)?;

        let signalfd = SignalFd::with_flags(
            &SigSet::empty(),
            SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC,
        )
        .context(NixSnafu)?;

        Ok(Registry {
            poll,
            exit: false,
            sources: HashMap::new(),
            state: HashMap::new(),
            pending: BinaryHeap::new(),
            seq: 0,
            timer: Timer::new(),
            timerfd,
            armed: None,
            signalfd,
        })
    }

    fn add_source(&mut self, source: Rc<dyn Source>) {
        let token = source.token();
        self.sources.insert(token, source);
        self.state.insert(
            token,
            State {
                state: EventState::Off,
                queued: false,
            },
        );
    }

    fn del_source(&mut self, source: &Rc<dyn Source>) -> Result<()> {
        let token = source.token();
        if self.sources.remove(&token).is_none() {
            return Err(Error::Other {
                word: "item not found",
            });
        }
        self.go_offline(source)?;

        // the token may be handed out again to a new allocation
        if self.state.get(&token).map_or(false, |s| s.queued) {
            let kept: Vec<Pending> = self
                .pending
                .drain()
                .filter(|p| p.source.token() != token)
                .collect();
            self.pending = kept.into_iter().collect();
        }
        self.state.remove(&token);
        Ok(())
    }

    fn set_enabled(&mut self, source: &Rc<dyn Source>, state: EventState) -> Result<()> {
        let token = source.token();
        match self.state.get(&token) {
            Some(current) if current.state == state => return Ok(()),
            Some(_) => {}
            None => {
                return Err(Error::Other {
                    word: "source not added",
                })
            }
        }

        // On and OneShot share one registration
        self.go_offline(source)?;
        if state != EventState::Off {
            self.go_online(source)?;
        }

        if let Some(current) = self.state.get_mut(&token) {
            current.state = state;
        }
        Ok(())
    }

    fn go_online(&mut self, source: &Rc<dyn Source>) -> Result<()> {
        let token = source.token();
        match source.event_type() {
            EventType::Io => {
                self.poll
                    .register(source.fd(), source.epoll_event(), token)?;
            }
            EventType::Signal => {
                let mut mask = SigSet::empty();
                for sig in source.signals() {
                    mask.add(sig);
                }
                mask.thread_block().context(NixSnafu)?;
                self.signalfd.set_mask(&mask).context(NixSnafu)?;
                self.poll
                    .register(self.signalfd.as_raw_fd(), source.epoll_event(), token)?;
            }
            EventType::Timer => self.timer.push(source.clone()),
            EventType::Defer => self.pending_push(source.clone()),
        }
        Ok(())
    }

    fn go_offline(&mut self, source: &Rc<dyn Source>) -> Result<()> {
        match self.state.get(&source.token()) {
            Some(current) if current.state != EventState::Off => {}
            _ => return Ok(()),
        }

        match source.event_type() {
            EventType::Io => self.poll.unregister(source.fd())?,
            EventType::Signal => self.poll.unregister(self.signalfd.as_raw_fd())?,
            EventType::Timer => self.timer.remove(source.token()),
            // a queued defer is skipped once its state reads Off
            EventType::Defer => {}
        }
        Ok(())
    }

    /// point the timerfd at the earliest deadline, or disarm it
    fn arm_timer(&mut self) -> Result<()> {
        let next = self.timer.next().filter(|at| *at < i64::MAX as u64);
        if next == self.armed {
            return Ok(());
        }

        let res = match next {
            Some(at) => self.timerfd.set(
                Expiration::OneShot(TimeSpec::microseconds(at as i64)),
                TimerSetTimeFlags::TFD_TIMER_ABSTIME,
            ),
            None => self.timerfd.unset(),
        };
        res.context(NixSnafu)?;
        self.armed = next;
        Ok(())
    }

    /// collect ready fds and due timers into the pending queue
    fn wait(&mut self, timeout: i32) -> Result<()> {
        for (token, _) in self.poll.wait(timeout)? {
            if token == TIMER_TOKEN {
                // EAGAIN means it was already drained
                let _ = unistd::read(self.timerfd.as_raw_fd(), &mut [0u8; 8]);
                self.armed = None;
                continue;
            }
            if let Some(source) = self.sources.get(&token).cloned() {
                self.pending_push(source);
            }
        }

        let now = now_usec();
        while let Some(source) = self.timer.pop_due(now) {
            self.pending_push(source);
        }
        Ok(())
    }

    fn pending_push(&mut self, source: Rc<dyn Source>) {
        let current = match self.state.get_mut(&source.token()) {
            Some(s) if !s.queued => s,
            _ => return,
        };
        current.queued = true;
        self.seq += 1;
        self.pending.push(Pending {
            priority: source.priority(),
            seq: self.seq,
            source,
        });
    }

    fn pending_pop(&mut self) -> Option<Rc<dyn Source>> {
        let top = self.pending.pop()?.source;
        if let Some(state) = self.state.get_mut(&top.token()) {
            state.queued = false;
        }
        Some(top)
    }

    fn clear(&mut self) {
        self.sources.clear();
        self.state.clear();
        self.pending.clear();
        self.timer = Timer::new();
    }
}
