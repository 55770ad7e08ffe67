//! Change-gated power reporting.
//!
//! Temperature and energy are only ever reported on their max-interval
//! timers; power additionally gets a short re-check that reports as soon as a
//! value moves by more than its threshold.

use crate::config::BridgeConfig;
use crate::measurements::MeasurementSet;

/// Power values as last reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerSnapshot {
    pub volts: u16,
    pub amps: u16,
    pub watts: i16,
}

impl PowerSnapshot {
    pub fn of(measurements: &MeasurementSet) -> Self {
        PowerSnapshot {
            volts: measurements.volts,
            amps: measurements.amps,
            watts: measurements.watts,
        }
    }
}

/// Minimum change that makes a power value worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeThresholds {
    pub volts: u32,
    pub amps: u32,
    pub watts: u32,
}

impl ChangeThresholds {
    pub fn from_config(config: &BridgeConfig) -> Self {
        ChangeThresholds {
            volts: config.volts_threshold,
            amps: config.amps_threshold,
            watts: config.watts_threshold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reporter {
    thresholds: ChangeThresholds,
    last: PowerSnapshot,
}

impl Reporter {
    pub fn new(thresholds: ChangeThresholds) -> Self {
        Reporter { thresholds, last: PowerSnapshot::default() }
    }

    /// Record the current power values as reported.
    pub fn snapshot(&mut self, measurements: &MeasurementSet) {
        self.last = PowerSnapshot::of(measurements);
    }

    pub fn last_reported(&self) -> PowerSnapshot {
        self.last
    }

    /// Whether any power value moved by more than its threshold.
    pub fn power_changed(&self, measurements: &MeasurementSet) -> bool {
        let current = PowerSnapshot::of(measurements);
        u32::from(self.last.volts.abs_diff(current.volts)) > self.thresholds.volts
            || u32::from(self.last.amps.abs_diff(current.amps)) > self.thresholds.amps
            || u32::from(self.last.watts.abs_diff(current.watts)) > self.thresholds.watts
    }

    /// Min-interval check. Returns true when power should be reported, in
    /// which case the snapshot has already been updated.
    pub fn on_min_interval(&mut self, measurements: &MeasurementSet) -> bool {
        if self.power_changed(measurements) {
            self.snapshot(measurements);
            true
        } else {
            false
        }
    }
}
