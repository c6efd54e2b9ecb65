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

//! Deadline queue behind the single monotonic timerfd
use crate::Source;
use basic::time::{NSEC_PER_USEC, USEC_INFINITY, USEC_PER_SEC};
use nix::time::{clock_gettime, ClockId};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

/// Current CLOCK_MONOTONIC reading in microseconds
pub(crate) fn now_usec() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) if ts.tv_sec() >= 0 => {
            (ts.tv_sec() as u64) * USEC_PER_SEC + (ts.tv_nsec() as u64) / NSEC_PER_USEC
        }
        _ => USEC_INFINITY,
    }
}

#[derive(Debug)]
struct Deadline {
    at: u64,
    source: Rc<dyn Source>,
}

// earliest deadline on top of the max-heap
impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl Eq for Deadline {}

#[derive(Debug, Default)]
pub(crate) struct Timer {
    heap: BinaryHeap<Deadline>,
}

impl Timer {
    pub(crate) fn new() -> Timer {
        Timer::default()
    }

    /// arm `source` to fire `time_relative()` microseconds from now
    pub(crate) fn push(&mut self, source: Rc<dyn Source>) {
        let at = now_usec().saturating_add(source.time_relative());
        self.heap.push(Deadline { at, source });
    }

    /// the earliest absolute deadline
    pub(crate) fn next(&self) -> Option<u64> {
        self.heap.peek().map(|d| d.at)
    }

    /// take one source whose deadline is not after `now`
    pub(crate) fn pop_due(&mut self, now: u64) -> Option<Rc<dyn Source>> {
        if self.next()? > now {
            return None;
        }
        self.heap.pop().map(|d| d.source)
    }

    pub(crate) fn remove(&mut self, token: u64) {
        let kept: Vec<Deadline> = self
            .heap
            .drain()
            .filter(|d| d.source.token() != token)
            .collect();
        self.heap = kept.into_iter().collect();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventType, Events};

    struct After(u64, u64);

    impl Source for After {
        fn event_type(&self) -> EventType {
            EventType::Timer
        }

        fn time_relative(&self) -> u64 {
            self.0
        }

        fn priority(&self) -> i8 {
            0
        }

        fn dispatch(&self, _: &Events) -> i32 {
            0
        }

        fn token(&self) -> u64 {
            self.1
        }
    }

    #[test]
    fn test_clock_advances() {
        let first = now_usec();
        let second = now_usec();
        assert!(second >= first);
        assert_ne!(first, USEC_INFINITY);
    }

    #[test]
    fn test_earliest_first() {
        let mut timer = Timer::new();
        timer.push(Rc::new(After(10 * USEC_PER_SEC, 1)));
        timer.push(Rc::new(After(0, 2)));

        let popped = timer.pop_due(now_usec()).unwrap();
        assert_eq!(popped.token(), 2);
        // the late one is not due yet
        assert!(timer.pop_due(now_usec()).is_none());
        assert!(timer.next().unwrap() > now_usec());

        timer.remove(1);
        assert!(timer.is_empty());
    }

    #[test]
    fn test_infinite_does_not_wrap() {
        let mut timer = Timer::new();
        timer.push(Rc::new(After(u64::MAX, 3)));
        assert_eq!(timer.next(), Some(u64::MAX));
        assert!(timer.pop_due(now_usec()).is_none());
    }
}
