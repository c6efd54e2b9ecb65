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


//! Log targets: console, syslog and the kernel ring buffer.
use log::Log;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    os::unix::net::UnixDatagram,
    sync::Mutex,
};

pub use crate::inner::{debug, error, info, trace, warn};
use crate::Level;

const SYSLOG_PATH: &str = "/dev/log";
const KMSG_PATH: &str = "/dev/kmsg";
/* LOG_DAEMON facility */
const FACILITY_DAEMON: u8 = 3 << 3;

/// Logger instance should implement `ReInit` too.
pub trait ReInit: Log {
    /// Define how logger instance reinitializes.
    fn reinit(&self) {}
}

fn syslog_priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

fn local_time() -> String {
    let time: libc::time_t = unsafe { libc::time(std::ptr::null_mut()) };
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    if unsafe { libc::localtime_r(&time, &mut tm) }.is_null() {
        return String::new();
    }
    format!(
        "{:0>4}-{:0>2}-{:0>2} {:0>2}:{:0>2}:{:0>2}",
        tm.tm_year + 1900, /* tm_year is years since 1900 */
        tm.tm_mon + 1,     /* tm_mon is months since Jan: [0, 11] */
        tm.tm_mday,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec
    )
}

/// `<pri>name[pid]: msg`, understood by both syslog daemons and /dev/kmsg
fn tagged_message(name: &str, record: &log::Record) -> String {
    format!(
        "<{}>{}[{}]: {}",
        FACILITY_DAEMON | syslog_priority(record.level()),
        name,
        std::process::id(),
        record.args()
    )
}

struct ConsoleLogger;

impl ReInit for ConsoleLogger {}

impl log::Log for ConsoleLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let module_path = record.module_path().unwrap_or("unknown");
        let line = format!(
            "{} {} {} {}\n",
            local_time(),
            record.level(),
            module_path,
            record.args()
        );
        /* stdout of the supervisor may be a log pipe of nobody, stderr is the console */
        let _ = std::io::stderr().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

struct SysLogger {
    name: String,
    dgram: Mutex<Option<UnixDatagram>>,
}

impl SysLogger {
    fn new(name: &str) -> std::io::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            dgram: Mutex::new(Some(Self::connect()?)),
        })
    }

    fn connect() -> std::io::Result<UnixDatagram> {
        let sock = UnixDatagram::unbound()?;
        sock.connect(SYSLOG_PATH)?;
        Ok(sock)
    }
}

impl ReInit for SysLogger {
    fn reinit(&self) {
        let dgram = match Self::connect() {
            Ok(dgram) => Some(dgram),
            Err(e) => {
                eprintln!("Failed to connect {}: {}", SYSLOG_PATH, e);
                None
            }
        };
        if let Ok(mut slot) = self.dgram.lock() {
            *slot = dgram;
        }
    }
}

impl log::Log for SysLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let msg = tagged_message(&self.name, record);
        if let Ok(slot) = self.dgram.lock() {
            if let Some(dgram) = slot.as_ref() {
                if let Err(e) = dgram.send(msg.as_bytes()) {
                    eprintln!("Failed to send message to syslog: {}", e);
                }
            }
        }
    }

    fn flush(&self) {}
}

struct KmsgLogger {
    name: String,
    file: Mutex<Option<File>>,
}

impl KmsgLogger {
    fn new(name: &str) -> std::io::Result<Self> {
        Ok(Self {
            name: name.to_string(),
            file: Mutex::new(Some(Self::open()?)),
        })
    }

    fn open() -> std::io::Result<File> {
        OpenOptions::new().write(true).open(KMSG_PATH)
    }
}

impl ReInit for KmsgLogger {
    fn reinit(&self) {
        if let Ok(mut slot) = self.file.lock() {
            *slot = Self::open().ok();
        }
    }
}

impl log::Log for KmsgLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let mut msg = tagged_message(&self.name, record);
        msg.push('\n');
        if let Ok(mut slot) = self.file.lock() {
            if let Some(file) = slot.as_mut() {
                /* one write per record, kmsg takes a record per write(2) */
                let _ = file.write(msg.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

/// Collect different kinds of loggers together that implements `ReInit` trait.
///
/// Include: ConsoleLogger, SysLogger, KmsgLogger
struct CombinedLogger {
    loggers: Vec<Box<dyn ReInit>>,
}

impl ReInit for CombinedLogger {
    fn reinit(&self) {
        for logger in self.loggers.iter() {
            logger.as_ref().reinit()
        }
    }
}

impl Log for CombinedLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        for logger in &self.loggers {
            logger.log(record);
        }
    }

    fn flush(&self) {
        for logger in &self.loggers {
            logger.flush();
        }
    }
}

/// Initialize the global static logger instance.
/// Available log `targets` include `console`, `syslog`, `kmsg`.
///
/// Repeated targets take effect only once. A target that can not be opened is
/// skipped, and the console is used when nothing else is left.
///
/// # Arguments
///
/// * `name` - The application name, used as the syslog/kmsg tag.
/// * `level` - Log message level.
/// * `targets` - A set of log targets.
pub fn init_log(name: &str, level: Level, targets: &[&str]) {
    crate::set_max_level(level.to_level_filter());

    let mut seen: Vec<&str> = Vec::new();
    let mut loggers: Vec<Box<dyn ReInit>> = Vec::new();
    for target in targets.iter().map(|t| t.trim()) {
        if seen.contains(&target) {
            continue;
        }
        seen.push(target);
        let logger = match target {
            "console" => Box::new(ConsoleLogger) as Box<dyn ReInit>,
            "syslog" => match SysLogger::new(name) {
                Ok(logger) => Box::new(logger) as Box<dyn ReInit>,
                Err(e) => {
                    eprintln!("{} failed to connect syslog: {}", name, e);
                    continue;
                }
            },
            "kmsg" => match KmsgLogger::new(name) {
                Ok(logger) => Box::new(logger) as Box<dyn ReInit>,
                Err(e) => {
                    eprintln!("{} failed to open {}: {}", name, KMSG_PATH, e);
                    continue;
                }
            },
            _ => {
                eprintln!("{} ignores unknown log target '{}'", name, target);
                continue;
            }
        };
        loggers.push(logger);
    }

    if loggers.is_empty() {
        loggers.push(Box::new(ConsoleLogger));
    }

    crate::inner::set_boxed_logger(Box::new(CombinedLogger { loggers }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_message() {
        let msg = tagged_message(
            "nitro",
            &log::Record::builder()
                .args(format_args!("service {} is up", "sshd"))
                .level(Level::Warn)
                .build(),
        );
        assert_eq!(
            msg,
            format!("<28>nitro[{}]: service sshd is up", std::process::id())
        );
    }

    #[test]
    fn test_local_time_shape() {
        let now = local_time();
        assert_eq!(now.len(), "2022-01-01 00:00:00".len());
    }
}
