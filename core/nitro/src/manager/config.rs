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

//
#![allow(non_snake_case)]

use confique::{Config, FileFormat, Partial};
use constants::CONFIG_FILE;
use std::time::Duration;

#[derive(Config, Debug)]
pub struct NitroConfig {
    #[config(env = "NITRO_LOG_LEVEL", default = "info")]
    pub LogLevel: String,
    #[config(default = "console")]
    pub LogTarget: String,

    #[config(default = 1000)]
    pub ReadyTimeoutMSec: u64,
    #[config(default = 1000)]
    pub SetupRetryMSec: u64,
    #[config(default = 2000)]
    pub MinUptimeMSec: u64,
    #[config(default = 1000)]
    pub RestartDelayMSec: u64,
    #[config(default = 7000)]
    pub KillTimeoutMSec: u64,
}

impl NitroConfig {
    pub fn new(file: Option<&str>) -> NitroConfig {
        type ConfigPartial = <NitroConfig as Config>::Partial;
        let mut partial: ConfigPartial = match Partial::from_env() {
            Err(_) => return NitroConfig::default(),
            Ok(v) => v,
        };
        partial =
            match confique::File::with_format(file.unwrap_or(CONFIG_FILE), FileFormat::Toml).load()
            {
                Err(_) => return NitroConfig::from_env_only(partial),
                Ok(v) => partial.with_fallback(v),
            };
        partial = partial.with_fallback(ConfigPartial::default_values());
        match NitroConfig::from_partial(partial) {
            Ok(v) => v,
            Err(_) => NitroConfig::default(),
        }
    }

    fn from_env_only(partial: <NitroConfig as Config>::Partial) -> NitroConfig {
        type ConfigPartial = <NitroConfig as Config>::Partial;
        NitroConfig::from_partial(partial.with_fallback(ConfigPartial::default_values()))
            .unwrap_or_default()
    }

    pub fn log_targets(&self) -> Vec<&str> {
        self.LogTarget
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ReadyTimeoutMSec)
    }

    pub fn setup_retry(&self) -> Duration {
        Duration::from_millis(self.SetupRetryMSec)
    }

    pub fn min_uptime(&self) -> Duration {
        Duration::from_millis(self.MinUptimeMSec)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.RestartDelayMSec)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.KillTimeoutMSec)
    }
}

impl Default for NitroConfig {
    fn default() -> Self {
        Self {
            LogLevel: "info".to_string(),
            LogTarget: "console".to_string(),
            ReadyTimeoutMSec: 1000,
            SetupRetryMSec: 1000,
            MinUptimeMSec: 2000,
            RestartDelayMSec: 1000,
            KillTimeoutMSec: 7000,
        }
    }
}

#[cfg(test)]
mod test {
    use libtests::get_workspace_file;
    use std::io::Write;

    use super::*;

    #[test]
    fn load() {
        let file = get_workspace_file("core/nitro/config/nitro.conf").unwrap();
        let config = NitroConfig::new(file.to_str());
        assert_eq!(config.MinUptimeMSec, 2000);
        assert_eq!(config.kill_timeout(), Duration::from_secs(7));
        assert_eq!(config.log_targets(), vec!["console"]);
    }

    #[test]
    fn load_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ReadyTimeoutMSec = 250").unwrap();
        writeln!(file, "LogTarget = \"syslog, console\"").unwrap();
        let config = NitroConfig::new(file.path().to_str());
        assert_eq!(config.ready_timeout(), Duration::from_millis(250));
        assert_eq!(config.SetupRetryMSec, 1000);
        assert_eq!(config.log_targets(), vec!["syslog", "console"]);
    }

    #[test]
    fn load_missing() {
        let config = NitroConfig::new(Some("/nonexistent/nitro.conf"));
        assert_eq!(config.RestartDelayMSec, 1000);
    }
}
