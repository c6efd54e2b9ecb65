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


//! process functions
use crate::error::*;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use procfs::process::Stat;
use std::collections::HashSet;
use std::fs::{read_dir, File};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const PF_KTHREAD: u64 = 0x00200000;
const MAX_ANCESTRY: usize = 64;

fn stat_of(pid: Pid) -> Result<Stat> {
    let path = PathBuf::from(format!("/proc/{}/stat", pid));
    Stat::from_reader(File::open(path).context(IoSnafu)?).context(ProcSnafu)
}

/// get the parent pid of the reference pid
pub fn get_ppid(pid: Pid) -> Result<Pid> {
    if pid == Pid::from_raw(0) || pid == nix::unistd::getpid() {
        return Ok(nix::unistd::getppid());
    }

    Ok(Pid::from_raw(stat_of(pid)?.ppid))
}

/// return true if `pid` is `ancestor` itself or one of its descendants
pub fn is_descendant(pid: Pid, ancestor: Pid) -> bool {
    let mut current = pid;
    for _ in 0..MAX_ANCESTRY {
        if current == ancestor {
            return true;
        }
        if current.as_raw() <= 1 {
            return false;
        }
        current = match get_ppid(current) {
            Ok(p) => p,
            Err(_) => return false,
        };
    }
    false
}

/// send signal to pid, send SIGCONT if the signal is not SIGCONT or SIGKILL
pub fn kill_and_cont(pid: Pid, sig: Signal) -> Result<(), Errno> {
    nix::sys::signal::kill(pid, sig)?;
    if sig != Signal::SIGCONT && sig != Signal::SIGKILL {
        let _ = nix::sys::signal::kill(pid, Signal::SIGCONT);
    }
    Ok(())
}

/// Send `signal` to every process except pid 1, ourselves and kernel threads,
/// returning the pids that were signalled.
pub fn kill_all_pids(signal: Signal) -> HashSet<i32> {
    let mut pids: HashSet<i32> = HashSet::new();
    let entries = match read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("failed to read /proc: {}", e);
            return pids;
        }
    };
    for entry in entries.flatten() {
        let pid_raw = match entry.file_name().to_str().map(str::parse::<i32>) {
            Some(Ok(pid)) => pid,
            _ => continue,
        };
        if ignore_proc_during_shutdown(Pid::from_raw(pid_raw)).unwrap_or(true) {
            continue;
        }
        log::debug!("killing pid: {} by signal {}", pid_raw, signal);
        if nix::sys::signal::kill(Pid::from_raw(pid_raw), signal).is_ok() {
            pids.insert(pid_raw);
        }
    }
    pids
}

/// Wait until all `pids` are gone or `timeout` elapsed, reaping our own
/// children on the way. Returns the pids that survived.
pub fn wait_pids(mut pids: HashSet<i32>, timeout: Duration) -> HashSet<i32> {
    let until = Instant::now() + timeout;

    loop {
        while let Ok(wait_status) = waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            match wait_status.pid() {
                Some(pid) => {
                    pids.remove(&pid.as_raw());
                }
                None => break,
            }
        }
        pids.retain(|pid| {
            !matches!(
                nix::sys::signal::kill(Pid::from_raw(*pid), None),
                Err(Errno::ESRCH)
            )
        });
        if pids.is_empty() {
            break;
        }

        if Instant::now() >= until {
            log::info!("some pids haven't been killed yet, stop waiting.");
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pids
}

fn ignore_proc_during_shutdown(pid: Pid) -> Result<bool> {
    if pid <= Pid::from_raw(1) || pid == nix::unistd::getpid() {
        return Ok(true);
    }

    Ok(stat_of(pid)?.flags as u64 & PF_KTHREAD != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_ancestry() {
        let me = nix::unistd::getpid();
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        assert_eq!(get_ppid(pid).unwrap(), me);
        assert!(is_descendant(pid, me));
        assert!(is_descendant(me, me));
        assert!(!is_descendant(me, pid));

        kill_and_cont(pid, Signal::SIGTERM).unwrap();
        // a concurrent wait_pids() may reap it first
        let _ = child.wait();
    }

    #[test]
    fn test_wait_pids() {
        let mut pids: HashSet<i32> = HashSet::new();
        for _ in 0..3 {
            let child = Command::new("sleep").arg("100").spawn().unwrap();
            pids.insert(child.id() as i32);
        }
        for pid in pids.iter() {
            nix::sys::signal::kill(Pid::from_raw(*pid), Signal::SIGKILL).unwrap();
        }

        let res = wait_pids(pids, Duration::from_secs(10));
        assert!(res.is_empty());
    }

    #[test]
    fn test_ignore_proc_during_shutdown() {
        assert!(ignore_proc_during_shutdown(Pid::from_raw(1)).unwrap());
        assert!(ignore_proc_during_shutdown(nix::unistd::getpid()).unwrap());
        let mut child = Command::new("sleep").arg("2").spawn().unwrap();
        assert!(!ignore_proc_during_shutdown(Pid::from_raw(child.id() as i32)).unwrap());
        let _ = child.kill();
        let _ = child.wait();
    }
}
