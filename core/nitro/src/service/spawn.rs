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

//! fork/exec of service scripts with a controlled descriptor set
use crate::error::*;
use nix::fcntl::{self, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::sys::wait::waitpid;
use nix::unistd::{self, ForkResult, Pid};
use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use walkdir::WalkDir;

/// Where a child descriptor comes from, descriptors absent from the plan are inherited
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FdSource {
    DevNull,
    Fd(RawFd),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FdPlan {
    map: Vec<(RawFd, FdSource)>,
}

impl FdPlan {
    pub(crate) fn new() -> Self {
        FdPlan::default()
    }

    /// child descriptor `target` will refer to `source`
    pub(crate) fn set(&mut self, target: RawFd, source: FdSource) -> &mut Self {
        self.map.retain(|(t, _)| *t != target);
        self.map.push((target, source));
        self
    }

    /// `fd` itself when no target can clobber it, otherwise a close-on-exec
    /// copy above every target
    fn lift(&self, fd: RawFd) -> nix::Result<RawFd> {
        match self.map.iter().map(|(t, _)| *t).max() {
            Some(top) if top >= fd => fcntl::fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(top + 1)),
            _ => Ok(fd),
        }
    }

    fn targets(&self) -> Vec<RawFd> {
        self.map.iter().map(|(t, _)| *t).collect()
    }

    /// Runs in the child. Sources are first lifted above every target so a
    /// source may carry the number of another target.
    fn apply(&self, keep: RawFd) -> nix::Result<()> {
        let floor = self
            .map
            .iter()
            .map(|(t, _)| *t)
            .chain(std::iter::once(keep))
            .max()
            .unwrap_or(2)
            .max(2)
            + 1;

        let mut lifted = Vec::with_capacity(self.map.len());
        for (target, source) in &self.map {
            let fd = match source {
                FdSource::DevNull => {
                    fcntl::open("/dev/null", OFlag::O_RDWR | OFlag::O_CLOEXEC, Mode::empty())?
                }
                FdSource::Fd(fd) => *fd,
            };
            lifted.push((*target, fcntl::fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(floor))?));
        }
        for (target, fd) in lifted {
            unistd::dup2(fd, target)?;
        }
        Ok(())
    }
}

fn close_all_fds(keep: &[RawFd]) {
    let fds: Vec<RawFd> = WalkDir::new("/proc/self/fd")
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().and_then(|s| s.parse().ok()))
        .collect();
    for fd in fds {
        if fd > 2 && !keep.contains(&fd) {
            let _ = unistd::close(fd);
        }
    }
}

fn default_all_signals() {
    basic::signal::reset_all_signal_handlers();
    /* nix::sys::signal::Signal doesn't cover the realtime range */
    for sig in libc::SIGRTMIN()..libc::SIGRTMAX() + 1 {
        let mut sig_action: libc::sigaction = unsafe { std::mem::zeroed() };
        sig_action.sa_sigaction = libc::SIG_DFL;
        unsafe { libc::sigaction(sig, &sig_action, std::ptr::null_mut()) };
    }
    basic::signal::reset_signal_mask();
}

fn cstring(s: &[u8], what: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::Other {
        msg: format!("{} contains a NUL byte", what),
    })
}

/// The child side, only returns when something failed
fn exec_child(
    path: &CStr,
    argv: &[CString],
    envp: &[CString],
    dir: &Path,
    plan: &FdPlan,
    err_fd: RawFd,
) -> nix::Error {
    default_all_signals();
    if let Err(e) = unistd::setsid() {
        return e;
    }
    if let Err(e) = plan.apply(err_fd) {
        return e;
    }
    let mut keep = plan.targets();
    keep.push(err_fd);
    close_all_fds(&keep);
    if let Err(e) = unistd::chdir(dir) {
        return e;
    }
    match unistd::execve(path, argv, envp) {
        Err(e) => e,
        Ok(never) => match never {},
    }
}

/// Spawn `exe` with `args`, running in `dir` with `env` added to our
/// environment. An exec failure in the child is reported as an error here.
pub(crate) fn spawn(
    exe: &Path,
    args: &[String],
    dir: &Path,
    plan: &FdPlan,
    env: &[(&str, &str)],
) -> Result<Pid> {
    let path = cstring(exe.as_os_str().as_bytes(), "path")?;
    let mut argv = vec![path.clone()];
    for a in args {
        argv.push(cstring(a.as_bytes(), "argument")?);
    }
    let mut envp = Vec::new();
    for (k, v) in std::env::vars_os() {
        if env.iter().any(|(key, _)| k.as_bytes() == key.as_bytes()) {
            continue;
        }
        let mut kv = k.as_bytes().to_vec();
        kv.push(b'=');
        kv.extend_from_slice(v.as_bytes());
        envp.push(cstring(&kv, "environment")?);
    }
    for (k, v) in env {
        envp.push(cstring(format!("{}={}", k, v).as_bytes(), "environment")?);
    }

    let (err_r, err_w) = basic::fd::pipe_cloexec().context(BasicSnafu)?;
    match unsafe { unistd::fork() } {
        Err(e) => {
            basic::fd::close(err_r);
            basic::fd::close(err_w);
            Err(Error::Spawn {
                path: exe.display().to_string(),
                source: e,
            })
        }
        Ok(ForkResult::Child) => {
            basic::fd::close(err_r);
            let err_w = match plan.lift(err_w) {
                Ok(fd) => fd,
                Err(e) => {
                    let _ = unistd::write(err_w, &(e as i32).to_le_bytes());
                    unsafe { libc::_exit(127) }
                }
            };
            let e = exec_child(&path, &argv, &envp, dir, plan, err_w);
            let _ = unistd::write(err_w, &(e as i32).to_le_bytes());
            unsafe { libc::_exit(127) }
        }
        Ok(ForkResult::Parent { child }) => {
            basic::fd::close(err_w);
            let mut buf = [0u8; 4];
            let mut len = 0;
            while len < buf.len() {
                match unistd::read(err_r, &mut buf[len..]) {
                    Ok(0) => break,
                    Ok(n) => len += n,
                    Err(nix::Error::EINTR) => continue,
                    Err(_) => break,
                }
            }
            basic::fd::close(err_r);

            if len == buf.len() {
                // the child never reached exec, it is ours to reap
                let _ = waitpid(child, None);
                return Err(Error::Spawn {
                    path: exe.display().to_string(),
                    source: nix::Error::from_i32(i32::from_le_bytes(buf)),
                });
            }
            Ok(child)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CHILDREN_LOCK;
    use libtests::write_script;
    use nix::sys::wait::WaitStatus;
    use std::fs;

    #[test]
    fn test_spawn_plan_and_env() {
        let _guard = CHILDREN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let run = write_script(dir.path(), "run", "echo \"$1 $NITRO_SOCK $(pwd)\" >&3").unwrap();
        let (r, w) = basic::fd::pipe_cloexec().unwrap();
        let mut plan = FdPlan::new();
        plan.set(0, FdSource::DevNull).set(3, FdSource::Fd(w));

        let pid = spawn(
            &run,
            &["inst".to_string()],
            dir.path(),
            &plan,
            &[("NITRO_SOCK", "/tmp/x.sock")],
        )
        .unwrap();
        basic::fd::close(w);
        assert!(matches!(waitpid(pid, None), Ok(WaitStatus::Exited(_, 0))));

        let mut out = vec![0u8; 512];
        let n = unistd::read(r, &mut out).unwrap();
        basic::fd::close(r);
        let out = String::from_utf8_lossy(&out[..n]).to_string();
        let cwd = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(out, format!("inst /tmp/x.sock {}\n", cwd.display()));
    }

    #[test]
    fn test_spawn_exec_failure() {
        let _guard = CHILDREN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let bad = write_script(dir.path(), "run", "#!/nonexistent/interpreter\n").unwrap();
        match spawn(&bad, &[], dir.path(), &FdPlan::new(), &[]) {
            Err(Error::Spawn { source, .. }) => assert_eq!(source, nix::Error::ENOENT),
            other => panic!("unexpected result {:?}", other.map(|p| p.as_raw())),
        }
    }

    #[test]
    fn test_lift_above_targets() {
        let (r, w) = basic::fd::pipe_cloexec().unwrap();
        let mut plan = FdPlan::new();
        assert_eq!(plan.lift(w).unwrap(), w);
        plan.set(w, FdSource::DevNull);
        let lifted = plan.lift(w).unwrap();
        assert!(lifted > w);
        for fd in [r, w, lifted] {
            basic::fd::close(fd);
        }
    }

    #[test]
    fn test_exec_failure_with_target_on_error_pipe() {
        let _guard = CHILDREN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let bad = write_script(dir.path(), "run", "#!/nonexistent/interpreter\n").unwrap();
        let (r, w) = basic::fd::pipe_cloexec().unwrap();
        // the two lowest free numbers, which the error pipe gets next
        let (a, b) = basic::fd::pipe_cloexec().unwrap();
        basic::fd::close(a);
        basic::fd::close(b);
        let mut plan = FdPlan::new();
        plan.set(a, FdSource::Fd(w)).set(b, FdSource::Fd(w));

        let res = spawn(&bad, &[], dir.path(), &plan, &[]);
        basic::fd::close(r);
        basic::fd::close(w);
        match res {
            Err(Error::Spawn { source, .. }) => assert_eq!(source, nix::Error::ENOENT),
            other => panic!("unexpected result {:?}", other.map(|p| p.as_raw())),
        }
    }
}
