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


//! The process-wide logger and the macros that feed it.
use std::{fmt, sync::RwLock};

use crate::logger::ReInit;
use log::Record;

static LOGGER: RwLock<Option<Box<dyn ReInit>>> = RwLock::new(None);

/// Set the global logger, replacing any previous one
pub fn set_boxed_logger(logger: Box<dyn ReInit>) {
    match LOGGER.write() {
        Ok(mut slot) => *slot = Some(logger),
        Err(poisoned) => *poisoned.into_inner() = Some(logger),
    }
}

/// Reopen the outputs of the global logger
pub(crate) fn reinit() {
    if let Ok(slot) = LOGGER.read() {
        if let Some(logger) = slot.as_ref() {
            logger.reinit();
        }
    }
}

/// Log at `$lvl` when the global max level lets it through
#[macro_export]
macro_rules! log {
    (target: $target:expr, $lvl:expr, $($arg:tt)+) => ({
        let lvl = $lvl;
        if lvl <= $crate::max_level() {
            $crate::inner::__private_api_log(
                format_args!($($arg)+),
                lvl,
                &($target, module_path!(), file!(), line!()),
            );
        }
    });
    ($lvl:expr, $($arg:tt)+) => ($crate::log!(target: module_path!(), $lvl, $($arg)+))
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! error {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log!(target: $target, $crate::Level::Error, $($arg)+)
    );
    ($($arg:tt)+) => (
        $crate::log!($crate::Level::Error, $($arg)+)
    )
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! warn {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log!(target: $target, $crate::Level::Warn, $($arg)+)
    );
    ($($arg:tt)+) => (
        $crate::log!($crate::Level::Warn, $($arg)+)
    )
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! info {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log!(target: $target, $crate::Level::Info, $($arg)+)
    );
    ($($arg:tt)+) => (
        $crate::log!($crate::Level::Info, $($arg)+)
    )
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! debug {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log!(target: $target, $crate::Level::Debug, $($arg)+)
    );
    ($($arg:tt)+) => (
        $crate::log!($crate::Level::Debug, $($arg)+)
    )
}

#[allow(missing_docs)]
#[macro_export]
macro_rules! trace {
    (target: $target:expr, $($arg:tt)+) => (
        $crate::log!(target: $target, $crate::Level::Trace, $($arg)+)
    );
    ($($arg:tt)+) => (
        $crate::log!($crate::Level::Trace, $($arg)+)
    )
}

/// flush the outputs of the global logger
#[macro_export]
macro_rules! flush {
    () => {
        $crate::inner::__private_api_flush();
    };
}

#[doc(hidden)]
pub fn __private_api_log(
    args: fmt::Arguments,
    level: crate::Level,
    &(target, module_path, file, line): &(&str, &'static str, &'static str, u32),
) {
    let slot = match LOGGER.read() {
        Ok(slot) => slot,
        Err(_) => return,
    };
    if let Some(logger) = slot.as_ref() {
        logger.log(
            &Record::builder()
                .args(args)
                .level(level)
                .target(target)
                .module_path_static(Some(module_path))
                .file_static(Some(file))
                .line(Some(line))
                .build(),
        );
    }
}

#[doc(hidden)]
pub fn __private_api_flush() {
    if let Ok(slot) = LOGGER.read() {
        if let Some(logger) = slot.as_ref() {
            logger.flush();
        }
    }
}

pub use crate::debug;
pub use crate::error;
pub use crate::info;
pub use crate::trace;
pub use crate::warn;
