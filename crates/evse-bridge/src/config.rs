//! Timing and threshold configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Longest period or delay accepted from configuration (one week).
pub const MAX_PERIOD_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Configuration for a bridge session.
///
/// Every field has a default, so a partial YAML block only needs the values
/// it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Charger name, used in logs and metric labels.
    pub name: String,
    /// Period of the poll scheduler wake-up (milliseconds).
    pub poll_period_ms: u64,
    /// How long to wait for a reply before resending (milliseconds).
    pub command_timeout_ms: u64,
    /// Resends allowed per command before it is abandoned.
    pub max_resends: u8,
    /// Delay before the first poll, giving the charger time to boot (milliseconds).
    pub startup_delay_ms: u64,
    /// Period of the change-gated power check (milliseconds).
    pub report_power_min_ms: u64,
    /// Longest gap between power reports (milliseconds).
    pub report_power_max_ms: u64,
    /// Longest gap between temperature reports (milliseconds).
    pub report_temp_max_ms: u64,
    /// Longest gap between energy reports (milliseconds).
    pub report_energy_max_ms: u64,
    /// Voltage change that triggers a power report, in tenths of a volt.
    pub volts_threshold: u32,
    /// Current change that triggers a power report, in tenths of an amp.
    pub amps_threshold: u32,
    /// Power change that triggers a power report, in tens of watts.
    pub watts_threshold: u32,
    /// Half-period of the identify blink (milliseconds).
    pub identify_blink_ms: u64,
    /// Number of blinks when the bridge joins a network.
    pub identify_blinks: u16,
    /// Delay before switching the display back off after a state change (milliseconds).
    pub backlight_restore_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            name: "openevse".to_string(),
            poll_period_ms: 200,
            command_timeout_ms: 1500,
            max_resends: 3,
            startup_delay_ms: 6000,
            report_power_min_ms: 2000,
            report_power_max_ms: 60_000,
            report_temp_max_ms: 120_000,
            report_energy_max_ms: 180_000,
            volts_threshold: 50,
            amps_threshold: 10,
            watts_threshold: 20,
            identify_blink_ms: 500,
            identify_blinks: 5,
            backlight_restore_ms: 5000,
        }
    }
}

impl BridgeConfig {
    /// Check that every period is non-zero.
    pub fn validate(&self) -> BridgeResult<()> {
        let periods = [
            ("poll_period_ms", self.poll_period_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("report_power_min_ms", self.report_power_min_ms),
            ("report_power_max_ms", self.report_power_max_ms),
            ("report_temp_max_ms", self.report_temp_max_ms),
            ("report_energy_max_ms", self.report_energy_max_ms),
            ("identify_blink_ms", self.identify_blink_ms),
        ];
        for (field, value) in periods {
            if value == 0 {
                return Err(BridgeError::InvalidConfig(format!("{field} must be non-zero")));
            }
        }
        let delays = [
            ("startup_delay_ms", self.startup_delay_ms),
            ("backlight_restore_ms", self.backlight_restore_ms),
        ];
        for (field, value) in periods.into_iter().chain(delays) {
            if value > MAX_PERIOD_MS {
                return Err(BridgeError::InvalidConfig(format!(
                    "{field} ({value}) exceeds {MAX_PERIOD_MS}"
                )));
            }
        }
        if self.command_timeout_ms <= self.poll_period_ms {
            return Err(BridgeError::InvalidConfig(format!(
                "command_timeout_ms ({}) must exceed poll_period_ms ({})",
                self.command_timeout_ms, self.poll_period_ms
            )));
        }
        Ok(())
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn report_power_min(&self) -> Duration {
        Duration::from_millis(self.report_power_min_ms)
    }

    pub fn report_power_max(&self) -> Duration {
        Duration::from_millis(self.report_power_max_ms)
    }

    pub fn report_temp_max(&self) -> Duration {
        Duration::from_millis(self.report_temp_max_ms)
    }

    pub fn report_energy_max(&self) -> Duration {
        Duration::from_millis(self.report_energy_max_ms)
    }

    pub fn identify_blink(&self) -> Duration {
        Duration::from_millis(self.identify_blink_ms)
    }

    pub fn backlight_restore(&self) -> Duration {
        Duration::from_millis(self.backlight_restore_ms)
    }
}
