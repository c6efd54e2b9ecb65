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

//! Log fan-in: one pipe per consumer service, shared by its producers
use super::name::{self, Kind};
use crate::error::*;
use std::collections::HashMap;
use std::fs;
use std::os::unix::io::RawFd;
use std::path::Path;

pub(crate) struct LogPipe {
    pub(crate) read: RawFd,
    pub(crate) write: RawFd,
}

impl Drop for LogPipe {
    fn drop(&mut self) {
        basic::fd::close(self.read);
        basic::fd::close(self.write);
    }
}

/// Resolve the `log` symlink of a service to the consumer's name. The link
/// must lead to an entry directly below `root`. A template consumer is
/// instantiated after the producer's instance, or after the producer itself.
pub(crate) fn resolve_target(root: &Path, dir: &Path, producer: &str, kind: &Kind) -> Option<String> {
    let link = dir.join("log");
    match fs::symlink_metadata(&link) {
        Ok(m) if m.file_type().is_symlink() => {}
        _ => return None,
    }
    let target = match fs::canonicalize(&link) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("log link of {} is dangling: {}", producer, e);
            return None;
        }
    };
    let root = fs::canonicalize(root).ok()?;
    let consumer = match name::from_argument(&target.to_string_lossy(), &root) {
        Ok(c) => c,
        Err(_) => {
            log::warn!("log link of {} leaves the service root: {:?}", producer, target);
            return None;
        }
    };

    match name::parse(&consumer) {
        Ok(Kind::Template) => Some(format!(
            "{}{}",
            consumer,
            kind.instance().unwrap_or(producer)
        )),
        Ok(Kind::Sys) | Err(_) => None,
        Ok(_) => Some(consumer),
    }
}

#[derive(Default)]
pub(crate) struct LogRouter {
    pipes: HashMap<String, LogPipe>,
}

impl LogRouter {
    pub(crate) fn new() -> Self {
        LogRouter::default()
    }

    /// the pipe feeding `consumer`, created on first use
    pub(crate) fn pipe(&mut self, consumer: &str) -> Result<&LogPipe> {
        if !self.pipes.contains_key(consumer) {
            let (read, write) = basic::fd::pipe_cloexec().context(BasicSnafu)?;
            log::debug!("created log pipe for {}", consumer);
            self.pipes
                .insert(consumer.to_string(), LogPipe { read, write });
        }
        self.pipes.get(consumer).ok_or_else(|| Error::Other {
            msg: format!("no log pipe for {}", consumer),
        })
    }

    /// drop the pipes whose consumer `keep` rejects
    pub(crate) fn gc(&mut self, keep: impl Fn(&str) -> bool) {
        self.pipes.retain(|consumer, _| {
            let kept = keep(consumer);
            if !kept {
                log::debug!("closing log pipe for {}", consumer);
            }
            kept
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pipes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_resolve_target() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        for d in ["sv", "logger", "mylog@", "inst@", "other"] {
            fs::create_dir(r.join(d)).unwrap();
        }
        symlink("../logger", r.join("sv/log")).unwrap();
        symlink("../mylog@", r.join("inst@/log")).unwrap();
        symlink("/tmp", r.join("other/log")).unwrap();

        assert_eq!(
            resolve_target(r, &r.join("sv"), "sv", &Kind::Plain),
            Some("logger".to_string())
        );
        let kind = name::parse("inst@one").unwrap();
        assert_eq!(
            resolve_target(r, &r.join("inst@"), "inst@one", &kind),
            Some("mylog@one".to_string())
        );
        assert_eq!(resolve_target(r, &r.join("other"), "other", &Kind::Plain), None);
        assert_eq!(resolve_target(r, &r.join("logger"), "logger", &Kind::Plain), None);
    }

    #[test]
    fn test_router_shares_and_collects() {
        let mut router = LogRouter::new();
        let fd = router.pipe("logger").unwrap().write;
        assert_eq!(router.pipe("logger").unwrap().write, fd);
        router.pipe("other").unwrap();
        assert_eq!(router.len(), 2);
        router.gc(|c| c == "logger");
        assert_eq!(router.len(), 1);
        assert!(!router.pipes.contains_key("other"));
    }
}
