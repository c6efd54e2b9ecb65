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


//! Common used constants by nitro and nitroctl.

/// Environment variable overriding the control socket path
pub const NITRO_SOCK_ENV: &str = "NITRO_SOCK";
/// Symlink consulted for the control socket path when the environment is silent
pub const NITRO_SOCK_LINK: &str = "/etc/nitro.sock";
/// Default control socket path
pub const DEFAULT_SOCK: &str = "/run/nitro/nitro.sock";
/// Subscription directory for event listeners, next to the control socket
pub const NOTIFY_DIR: &str = "notify";

/// Default supervision root
pub const DEFAULT_SERVICE_DIR: &str = "/etc/nitro";
/// Default configuration file of the daemon
pub const CONFIG_FILE: &str = "/etc/nitro.conf";

/// The boot/shutdown pseudo-service
pub const SYS_SERVICE: &str = "SYS";

/// Exit code of a setup script that asks not to be retried.
/// Also the control exit status for unknown services.
pub const EXIT_FATAL: i32 = 111;

/// invalid fd
pub const INVALID_FD: i32 = -1;

/// Resolve the control socket path: `$NITRO_SOCK`, then the target of
/// `/etc/nitro.sock`, then the built-in default.
pub fn control_socket() -> std::path::PathBuf {
    if let Some(path) = std::env::var_os(NITRO_SOCK_ENV) {
        if !path.is_empty() {
            return path.into();
        }
    }
    if let Ok(target) = std::fs::read_link(NITRO_SOCK_LINK) {
        return target;
    }
    DEFAULT_SOCK.into()
}

/// The event subscription directory belonging to a control socket path.
pub fn notify_dir(sock: &std::path::Path) -> std::path::PathBuf {
    sock.parent()
        .unwrap_or_else(|| std::path::Path::new("/"))
        .join(NOTIFY_DIR)
}
