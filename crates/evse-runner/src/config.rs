//! Runner configuration.
//!
//! A YAML file provides the bridge timings and the link settings; command
//! line flags override individual values.
//!
//! ```yaml
//! bridge:
//!   name: garage
//!   report_power_min_ms: 5000
//! link:
//!   port: /dev/ttyUSB0
//!   baud_rate: 115200
//! settings_path: /var/lib/openevse/settings.json
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use evse_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RunnerError, RunnerResult};

/// Serial link settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: Option<String>,
    /// `host:port` of a networked serial server, used instead of `port`.
    pub tcp: Option<String>,
    pub baud_rate: u32,
    /// Transport read timeout (milliseconds).
    pub read_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            port: None,
            tcp: None,
            baud_rate: 115_200,
            read_timeout_ms: 50,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Complete runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub bridge: BridgeConfig,
    pub link: LinkConfig,
    /// Where the persistent settings live.
    pub settings_path: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            bridge: BridgeConfig::default(),
            link: LinkConfig::default(),
            settings_path: PathBuf::from("openevse-settings.json"),
        }
    }
}

impl RunnerConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> RunnerResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> RunnerResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check that exactly one link is configured and the bridge timings are usable.
    pub fn validate(&self) -> RunnerResult<()> {
        match (&self.link.port, &self.link.tcp) {
            (Some(_), Some(_)) => {
                return Err(RunnerError::Config("both a serial port and a TCP address are configured".into()))
            }
            (None, None) => return Err(RunnerError::Config("no serial port or TCP address configured".into())),
            _ => {}
        }
        if self.link.baud_rate == 0 {
            return Err(RunnerError::Config("baud_rate must be non-zero".into()));
        }
        self.bridge.validate()?;
        Ok(())
    }
}
