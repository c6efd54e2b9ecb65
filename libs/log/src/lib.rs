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


//! Logging facade of the supervisor: a process-wide logger fed through
//! crate-local macros, writing to the console, syslog or the kernel log.
pub mod inner;
pub mod logger;

/// reexport log::Log
pub use log::max_level;
pub use log::set_max_level;
pub use log::Log;
pub use log::{Level, LevelFilter};
pub use log::{Metadata, Record};

pub use logger::init_log;

/// Reopen the syslog and kmsg outputs of the current logger
pub fn reinit() {
    inner::reinit();
}

/// Parse a level name as found in configuration files.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::Error),
        "warn" | "warning" => Some(Level::Warn),
        "info" => Some(Level::Info),
        "debug" => Some(Level::Debug),
        "trace" => Some(Level::Trace),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::{init_log, parse_level, reinit, Level, LevelFilter};

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Some(Level::Debug));
        assert_eq!(parse_level(" WARN "), Some(Level::Warn));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_init_log_and_reinit() {
        init_log("test", Level::Debug, &["console"]);
        assert_eq!(crate::max_level(), LevelFilter::Debug);
        crate::error!("hello, error!");
        crate::set_max_level(LevelFilter::Info);
        crate::debug!("hello debug!"); /* Won't print */
        crate::info!("hello, info!");
        reinit();
        crate::flush!();

        /* unknown targets are skipped */
        init_log("test", Level::Info, &["nowhere", "console"]);
        crate::warn!("still logging to {}", "console");
    }
}
