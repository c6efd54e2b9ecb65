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

//! nitroctl, the control client of nitro

use clap::Parser;
use cmdproto::{
    error::ERROR_CODE_MASK_PRINT_STDOUT,
    proto::{Action, CommandRequest, ProstClientStream},
};
use constants::EXIT_FATAL;
use nix::sys::reboot::{self, RebootMode};
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::process::exit;
use std::time::Duration;

/// exit status when the daemon does not answer in time
const EXIT_TIMEOUT: i32 = 2;

/// parse program arguments
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Seconds to wait for start, stop and restart
    #[clap(short = 't', long, default_value_t = 5)]
    timeout: u64,

    /// What to do, `list` when omitted
    #[clap(subcommand)]
    subcmd: Option<SubCmd>,
}

#[derive(Parser, Debug, PartialEq, Eq)]
enum SubCmd {
    /// List all services
    #[clap(display_order = 1, alias = "l")]
    List {},

    /// Set services wanted up and start them
    #[clap(display_order = 2, alias = "u")]
    Up {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Set services wanted down and stop them
    #[clap(display_order = 3, alias = "d")]
    Down {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Start services and wait until they are up
    #[clap(display_order = 4)]
    Start {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Stop services and wait until they are down
    #[clap(display_order = 5)]
    Stop {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Restart services and wait until they are up
    #[clap(display_order = 6, alias = "r")]
    Restart {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Restart services without the crash-loop delay
    #[clap(display_order = 7)]
    FastRestart {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Stop services with SIGHUP
    #[clap(display_order = 8, alias = "h")]
    Hup {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Print the pid of services
    #[clap(display_order = 9)]
    Pidof {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Fail unless all services are up
    #[clap(display_order = 10)]
    Check {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Report the calling service ready
    #[clap(display_order = 11)]
    Ready { service: String },

    /// Block until services are up
    #[clap(display_order = 12)]
    WaitUp {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Block until services are down
    #[clap(display_order = 13)]
    WaitDown {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Rescan the service directory
    #[clap(display_order = 14, alias = "s", alias = "scan")]
    Rescan {},

    /// Print daemon pid, service count and reap counters
    #[clap(display_order = 15)]
    Info {},

    /// Send SIGSTOP
    #[clap(display_order = 20, alias = "p")]
    Pause {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGCONT
    #[clap(display_order = 21, alias = "c")]
    Cont {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGALRM
    #[clap(display_order = 22, alias = "a")]
    Alarm {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGINT
    #[clap(display_order = 23, alias = "i")]
    Interrupt {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGQUIT
    #[clap(display_order = 24, alias = "q")]
    Quit {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGTERM
    #[clap(display_order = 25, alias = "t")]
    Term {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGKILL
    #[clap(display_order = 26, alias = "k")]
    Kill {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGUSR1
    #[clap(display_order = 27, name = "1")]
    Usr1 {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Send SIGUSR2
    #[clap(display_order = 28, name = "2")]
    Usr2 {
        #[clap(required = true)]
        services: Vec<String>,
    },

    /// Shut the system (or the supervisor) down
    #[clap(display_order = 30, name = "Shutdown")]
    Shutdown {
        /// Power off right away, without the supervisor
        #[clap(short)]
        force: bool,
    },

    /// Reboot the system (or restart the supervised set)
    #[clap(display_order = 31, name = "Reboot")]
    Reboot {
        /// Reboot right away, without the supervisor
        #[clap(short)]
        force: bool,
    },
}

impl SubCmd {
    /// wait-up and wait-down block for as long as it takes
    fn unbounded(&self) -> bool {
        matches!(self, SubCmd::WaitUp { .. } | SubCmd::WaitDown { .. })
    }
}

/// Paths are resolved here, the daemon only maps canonical paths to names.
fn canonical_names(services: Vec<String>) -> Result<Vec<String>, String> {
    services
        .into_iter()
        .map(|s| {
            if !s.starts_with('/') && !s.starts_with('.') {
                return Ok(s);
            }
            std::fs::canonicalize(&s)
                .map(|p| p.to_string_lossy().to_string())
                .map_err(|e| format!("no such service: {}: {}", s, e))
        })
        .collect()
}

/// Generate CommandRequest based on parsed args
/// clap Args => protobuf based CommandRequest
fn generate_command_request(subcmd: SubCmd) -> Result<CommandRequest, String> {
    let service = |action: Action, services: Vec<String>| {
        canonical_names(services).map(|names| CommandRequest::new_service(action, names))
    };
    let signal = |sig: libc::c_int, services: Vec<String>| {
        canonical_names(services).map(|names| CommandRequest::new_signal(sig, names))
    };

    match subcmd {
        SubCmd::List {} => Ok(CommandRequest::new_global(Action::List)),
        SubCmd::Up { services } => service(Action::Up, services),
        SubCmd::Down { services } => service(Action::Down, services),
        SubCmd::Start { services } => service(Action::Start, services),
        SubCmd::Stop { services } => service(Action::Stop, services),
        SubCmd::Restart { services } => service(Action::Restart, services),
        SubCmd::FastRestart { services } => service(Action::FastRestart, services),
        SubCmd::Hup { services } => service(Action::Hup, services),
        SubCmd::Pidof { services } => service(Action::Pidof, services),
        SubCmd::Check { services } => service(Action::Check, services),
        SubCmd::Ready { service: s } => service(Action::Ready, vec![s]),
        SubCmd::WaitUp { services } => service(Action::WaitUp, services),
        SubCmd::WaitDown { services } => service(Action::WaitDown, services),
        SubCmd::Rescan {} => Ok(CommandRequest::new_global(Action::Rescan)),
        SubCmd::Info {} => Ok(CommandRequest::new_global(Action::Info)),

        SubCmd::Pause { services } => signal(libc::SIGSTOP, services),
        SubCmd::Cont { services } => signal(libc::SIGCONT, services),
        SubCmd::Alarm { services } => signal(libc::SIGALRM, services),
        SubCmd::Interrupt { services } => signal(libc::SIGINT, services),
        SubCmd::Quit { services } => signal(libc::SIGQUIT, services),
        SubCmd::Term { services } => signal(libc::SIGTERM, services),
        SubCmd::Kill { services } => signal(libc::SIGKILL, services),
        SubCmd::Usr1 { services } => signal(libc::SIGUSR1, services),
        SubCmd::Usr2 { services } => signal(libc::SIGUSR2, services),

        SubCmd::Shutdown { .. } => Ok(CommandRequest::new_global(Action::Shutdown)),
        SubCmd::Reboot { .. } => Ok(CommandRequest::new_global(Action::Reboot)),
    }
}

/// Rewrite the command line when invoked as halt, poweroff, shutdown,
/// reboot or init.
fn rewrite_args(mut str_args: Vec<String>) -> Result<Vec<String>, String> {
    if str_args.is_empty() {
        return Ok(str_args);
    }

    let called = match std::path::Path::new(&str_args[0]).file_name() {
        Some(file_name) => file_name.to_string_lossy().to_string(),
        None => return Ok(str_args),
    };

    match called.as_str() {
        "halt" | "poweroff" | "shutdown" => str_args.insert(1, "Shutdown".to_string()),
        "reboot" => str_args.insert(1, "Reboot".to_string()),
        "init" => {
            let subcmd = match str_args.get(1).map(String::as_str) {
                Some("0") => "Shutdown",
                Some("6") => "Reboot",
                Some("q") => "rescan",
                _ => return Err("usage: init [0|6|q]".to_string()),
            };
            str_args.truncate(1);
            str_args.push(subcmd.to_string());
        }
        _ => {}
    }
    Ok(str_args)
}

fn force(subcmd: &SubCmd) {
    let mode = match subcmd {
        SubCmd::Shutdown { force: true } => RebootMode::RB_POWER_OFF,
        SubCmd::Reboot { force: true } => RebootMode::RB_AUTOBOOT,
        _ => return,
    };
    nix::unistd::sync();
    if let Err(e) = reboot::reboot(mode) {
        eprintln!("nitroctl: reboot: {}", e);
        exit(1);
    }
}

fn main() {
    let str_args = match rewrite_args(std::env::args().collect()) {
        Ok(v) => v,
        Err(usage) => {
            eprintln!("{}", usage);
            exit(1);
        }
    };
    let args = Args::parse_from(str_args);
    let subcmd = args.subcmd.unwrap_or(SubCmd::List {});
    force(&subcmd);

    let timeout = match subcmd.unbounded() {
        true => None,
        false => Some(Duration::from_secs(args.timeout.max(1))),
    };
    let command_request = match generate_command_request(subcmd) {
        Err(e) => {
            eprintln!("nitroctl: {}", e);
            exit(EXIT_FATAL);
        }
        Ok(v) => v,
    };

    let sock = constants::control_socket();
    let stream = match UnixStream::connect(&sock) {
        Err(e) => {
            eprintln!(
                "nitroctl: could not connect to '{}', is nitro started? {}",
                sock.display(),
                e
            );
            exit(EXIT_FATAL);
        }
        Ok(v) => v,
    };
    if let Err(e) = stream.set_read_timeout(timeout) {
        eprintln!("nitroctl: {}", e);
    }

    let mut client = ProstClientStream::new(stream);

    let data = match client.execute(command_request) {
        Err(e) if e.is_timeout() => {
            eprintln!("nitroctl: action timed out");
            exit(EXIT_TIMEOUT);
        }
        Err(e) => {
            eprintln!("nitroctl: failed to execute the given command: {}", e);
            exit(1);
        }
        Ok(v) => v,
    };

    /* We should always print the error message if the returned error code is not 0. */
    if !data.message.is_empty() {
        if data.error_code == 0 || (data.error_code & ERROR_CODE_MASK_PRINT_STDOUT != 0) {
            /* Don't care if we fail to write the message out. */
            let _ = writeln!(std::io::stdout(), "{}", data.message);
        } else {
            eprintln!("nitroctl: {}", data.message);
        }
    }

    exit((data.error_code & !ERROR_CODE_MASK_PRINT_STDOUT) as i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn parse(v: &[&str]) -> SubCmd {
        Args::parse_from(rewrite_args(args(v)).unwrap())
            .subcmd
            .unwrap_or(SubCmd::List {})
    }

    #[test]
    fn test_called_as() {
        assert_eq!(parse(&["/sbin/poweroff"]), SubCmd::Shutdown { force: false });
        assert_eq!(parse(&["reboot", "-f"]), SubCmd::Reboot { force: true });
        assert_eq!(parse(&["init", "q"]), SubCmd::Rescan {});
        assert!(rewrite_args(args(&["init", "3"])).is_err());
        assert_eq!(parse(&["nitroctl"]), SubCmd::List {});
    }

    #[test]
    fn test_aliases() {
        assert_eq!(
            parse(&["nitroctl", "u", "a", "b"]),
            SubCmd::Up {
                services: args(&["a", "b"])
            }
        );
        assert_eq!(parse(&["nitroctl", "scan"]), SubCmd::Rescan {});
        assert_eq!(
            parse(&["nitroctl", "k", "a"]),
            SubCmd::Kill {
                services: args(&["a"])
            }
        );
        assert_eq!(
            parse(&["nitroctl", "fast-restart", "a"]),
            SubCmd::FastRestart {
                services: args(&["a"])
            }
        );
        let a = Args::parse_from(args(&["nitroctl", "-t", "9", "wait-up", "a"]));
        assert_eq!(a.timeout, 9);
        assert!(a.subcmd.unwrap().unbounded());
    }

    #[test]
    fn test_requests() {
        let req = generate_command_request(parse(&["nitroctl", "1", "a"])).unwrap();
        assert_eq!(req.action, Action::Signal as i32);
        assert_eq!(req.signal, libc::SIGUSR1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();
        let req = generate_command_request(SubCmd::Stop {
            services: vec![path, "plain".to_string()],
        })
        .unwrap();
        assert_eq!(
            req.names,
            vec![
                std::fs::canonicalize(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string(),
                "plain".to_string()
            ]
        );
        assert!(generate_command_request(SubCmd::Check {
            services: args(&["./does/not/exist"])
        })
        .is_err());
    }
}
