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

use crate::error::*;
use event::{EventType, Events, Source};
use nix::sys::signal::Signal;
use nix::sys::signalfd::siginfo;

pub(crate) const EVENT_SIGNALS: [Signal; 4] = [
    Signal::SIGCHLD,
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGHUP,
];

pub(super) struct Signals<T> {
    signal_handler: T,
}

pub(super) trait SignalDispatcher {
    fn dispatch_signal(&self, signal: &siginfo) -> Result<i32>;
}

impl<T> Signals<T> {
    pub(super) fn new(data_handler: T) -> Self {
        Signals {
            signal_handler: data_handler,
        }
    }
}

impl<T: SignalDispatcher> Source for Signals<T> {
    fn event_type(&self) -> EventType {
        EventType::Signal
    }

    fn signals(&self) -> Vec<Signal> {
        Vec::from(EVENT_SIGNALS)
    }

    fn epoll_event(&self) -> u32 {
        (libc::EPOLLIN) as u32
    }

    fn dispatch(&self, e: &Events) -> i32 {
        log::debug!("Dispatching signals!");

        if let Some(info) = e.read_signals() {
            log::debug!("read signal from event: {}", info.ssi_signo);
            if let Err(e) = self.signal_handler.dispatch_signal(&info) {
                log::error!("dispatch signal failed : {}", e);
            }
        }

        0
    }

    fn token(&self) -> u64 {
        let data: u64 = unsafe { std::mem::transmute(self) };
        data
    }

    fn priority(&self) -> i8 {
        -6i8
    }

    fn description(&self) -> String {
        String::from("signals")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event::EventState;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        seen: RefCell<Vec<u32>>,
    }

    impl SignalDispatcher for Rc<Recorder> {
        fn dispatch_signal(&self, signal: &siginfo) -> Result<i32> {
            self.seen.borrow_mut().push(signal.ssi_signo);
            Ok(0)
        }
    }

    #[test]
    fn test_signal_dispatch() {
        let recorder = Rc::new(Recorder {
            seen: RefCell::new(Vec::new()),
        });
        let e = Events::new().unwrap();
        let signals: Rc<dyn Source> = Rc::new(Signals::new(recorder.clone()));
        e.add_source(signals.clone()).unwrap();
        e.set_enabled(signals.clone(), EventState::On).unwrap();

        nix::sys::signal::raise(Signal::SIGHUP).unwrap();
        e.run(100).unwrap();
        assert_eq!(*recorder.seen.borrow(), vec![libc::SIGHUP as u32]);
        e.del_source(signals).unwrap();
    }
}
