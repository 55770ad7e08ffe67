//! Values handed to the attribute layer.

use serde::{Deserialize, Serialize};

/// Width mask of the energy sum attribute (48 bits).
pub const ENERGY_SUM_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// Width mask of the energy demand attribute (24 bits).
pub const ENERGY_DEMAND_MASK: u32 = 0xFF_FFFF;

/// A measurement group ready for delivery.
///
/// Field widths match the attributes they populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "report", rename_all = "snake_case")]
pub enum Report {
    /// Volts and amps in tenths, watts in tens.
    Power { volts: u16, amps: u16, watts: i16 },
    Temperature { celsius: i16 },
    Energy { sum_wh: u64, demand_wh: u32 },
    State { state: u16 },
}

impl Report {
    /// Build an energy report, truncating both values to their attribute width.
    pub fn energy(sum_wh: u64, demand_wh: u32) -> Self {
        Report::Energy {
            sum_wh: sum_wh & ENERGY_SUM_MASK,
            demand_wh: demand_wh & ENERGY_DEMAND_MASK,
        }
    }

    /// Short name used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Report::Power { .. } => "power",
            Report::Temperature { .. } => "temperature",
            Report::Energy { .. } => "energy",
            Report::State { .. } => "state",
        }
    }
}
