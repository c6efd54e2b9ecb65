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

//! nitro, a small service supervisor.
//!
//! Every directory below the supervision root is a service: `run` is the
//! long-running process, `setup` and `finish` bracket it, `down` keeps it
//! from starting on boot and `log` pipes its output into another service.

mod error;
mod manager;
mod service;

use crate::error::*;
use crate::manager::config::NitroConfig;
use crate::manager::Manager;
use clap::Parser;
use libc::{prctl, PR_SET_CHILD_SUBREAPER};
use std::path::PathBuf;
use std::rc::Rc;

/// parse program arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Configuration file
    #[clap(short, long)]
    config: Option<String>,

    /// Supervision root
    #[clap(default_value = constants::DEFAULT_SERVICE_DIR)]
    dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    /* Ignore everything up front, the signals we care about are read
     * through a signalfd once the event loop is set up. */
    ignore_all_signals();

    let config = Rc::new(NitroConfig::new(args.config.as_deref()));
    let level = log::parse_level(&config.LogLevel).unwrap_or_else(|| {
        eprintln!("unsupported log level {:?}, using info", config.LogLevel);
        log::Level::Info
    });
    log::init_log("nitro", level, &config.log_targets());

    set_child_reaper();

    let sock = constants::control_socket();
    let manager = Manager::new(Rc::clone(&config), &args.dir, &sock)?;
    manager.startup()?;

    let reason = manager.main_loop()?;
    log::info!("nitro end its main loop: {}", reason);
    drop(manager);

    Manager::finish_system(reason);
    Ok(())
}

fn set_child_reaper() {
    let ret = unsafe { prctl(PR_SET_CHILD_SUBREAPER, 1, 0, 0, 0) };

    if ret < 0 {
        log::warn!(
            "failed to set child reaper: {}",
            std::io::Error::last_os_error()
        );
    }
}

fn ignore_all_signals() {
    /* nix::sys::signal::Signal doesn't support SIGRTMAX, use libc.
     * SIGCHLD keeps its default, ignoring it would auto-reap children. */
    for sig in 1..libc::SIGRTMAX() + 1 {
        if [libc::SIGKILL, libc::SIGSTOP, libc::SIGCHLD].contains(&sig) {
            continue;
        }

        let mut sig_action: libc::sigaction = unsafe { std::mem::zeroed() };
        sig_action.sa_flags = libc::SA_RESTART;
        sig_action.sa_sigaction = libc::SIG_IGN;
        let r = unsafe { libc::sigaction(sig, &sig_action, std::ptr::null_mut()) };
        if r < 0 {
            log::warn!(
                "Failed to ignore signal {}: {}",
                sig,
                std::io::Error::last_os_error()
            );
        }
    }
}
