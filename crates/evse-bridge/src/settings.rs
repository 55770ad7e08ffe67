//! Settings that survive a restart.

use serde::{Deserialize, Serialize};

/// Energy limit meaning "no limit".
pub const UNLIMITED_ENERGY: u32 = 0xFF_FFFF;

/// Persistent bridge settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether the charger's display should be lit.
    pub backlight_on: bool,
    /// Energy limit in watt-hours, [`UNLIMITED_ENERGY`] for none.
    pub energy_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            backlight_on: true,
            energy_limit: UNLIMITED_ENERGY,
        }
    }
}

impl Settings {
    /// The limit as the charger's `SH` command expects it.
    ///
    /// The charger takes 0 for "unlimited". Anything at or beyond
    /// [`UNLIMITED_ENERGY`] does not fit the attribute and is sent as
    /// unlimited too.
    pub fn limit_argument(limit: u32) -> i32 {
        if limit >= UNLIMITED_ENERGY {
            return 0;
        }
        i32::try_from(limit).unwrap_or(0)
    }
}
