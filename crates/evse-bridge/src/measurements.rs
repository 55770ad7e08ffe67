//! Last-known charger measurements.
//!
//! Raw readings from [`evse_rapi::Reply`] are scaled here into the fixed-point
//! units the attribute layer expects: volts and amps in tenths, watts in tens,
//! whole degrees, watt-hours.

use evse_rapi::{EnergyReading, PowerReading, Reply, SettingsReading, TemperatureReading, STATE_SLEEPING};

use crate::report::Report;

/// Nominal line voltage for level 1 service, in tenths of a volt.
pub const LEVEL1_NOMINAL_VOLTS: u16 = 1200;

/// Nominal line voltage for level 2 service, in tenths of a volt.
pub const LEVEL2_NOMINAL_VOLTS: u16 = 2400;

/// Temperature assumed until the first reading arrives.
pub const DEFAULT_TEMPERATURE_C: i16 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementSet {
    /// Tenths of a volt.
    pub volts: u16,
    /// Tenths of an amp.
    pub amps: u16,
    /// Tens of watts.
    pub watts: i16,
    pub temperature_c: i16,
    /// Energy delivered this session, watt-hours.
    pub energy_demand_wh: u32,
    /// Lifetime energy, watt-hours.
    pub energy_sum_wh: u64,
    pub state: u16,
    /// Service level, 1 or 2.
    pub power_level: u8,
    /// Charger current capacity reported by `GE`, amps.
    pub capacity_amps: u16,
    /// Commanded on/off of the charger.
    pub on_off: bool,
    /// Desired display backlight.
    pub backlight_on: bool,
}

impl Default for MeasurementSet {
    fn default() -> Self {
        MeasurementSet {
            volts: 0,
            amps: 0,
            watts: 0,
            temperature_c: DEFAULT_TEMPERATURE_C,
            energy_demand_wh: 0,
            energy_sum_wh: 0,
            state: 0,
            power_level: 1,
            capacity_amps: 0,
            on_off: false,
            backlight_on: true,
        }
    }
}

impl MeasurementSet {
    /// Fold a parsed reply into the measurements.
    pub fn apply(&mut self, reply: &Reply) {
        match reply {
            Reply::Power(reading) => self.apply_power(reading),
            Reply::Temperature(reading) => self.apply_temperature(reading),
            Reply::Energy(reading) => self.apply_energy(reading),
            Reply::State(state) => self.state = *state,
            Reply::Settings(reading) => self.apply_settings(reading),
            Reply::Done => {}
        }
    }

    fn apply_power(&mut self, reading: &PowerReading) {
        self.volts = match reading.millivolts {
            Some(millivolts) => clamp_u16(millivolts / 100),
            None if self.power_level == 2 => LEVEL2_NOMINAL_VOLTS,
            None => LEVEL1_NOMINAL_VOLTS,
        };
        if let Some(milliamps) = reading.milliamps {
            self.amps = clamp_u16(milliamps / 100);
        }
        // Float-to-int `as` saturates at the i16 bounds.
        self.watts = (f64::from(self.volts) * f64::from(self.amps) * 0.001) as i16;
    }

    fn apply_temperature(&mut self, reading: &TemperatureReading) {
        let degrees = reading.ds3231_tenths / 10;
        self.temperature_c = degrees.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
    }

    fn apply_energy(&mut self, reading: &EnergyReading) {
        let demand = reading.session_watt_seconds.max(0) / 3600;
        self.energy_demand_wh = u32::try_from(demand).unwrap_or(u32::MAX);
        self.energy_sum_wh = u64::try_from(reading.accumulated_watt_hours).unwrap_or(0);
    }

    fn apply_settings(&mut self, reading: &SettingsReading) {
        self.power_level = reading.power_level();
        self.capacity_amps = clamp_u16(reading.amps);
    }

    /// Apply an unsolicited state push: the state is stored and the charger
    /// counts as off only while sleeping.
    pub fn apply_state_push(&mut self, state: u16) {
        self.state = state;
        self.on_off = state != STATE_SLEEPING;
    }

    pub fn power_report(&self) -> Report {
        Report::Power {
            volts: self.volts,
            amps: self.amps,
            watts: self.watts,
        }
    }

    pub fn temperature_report(&self) -> Report {
        Report::Temperature { celsius: self.temperature_c }
    }

    pub fn energy_report(&self) -> Report {
        Report::energy(self.energy_sum_wh, self.energy_demand_wh)
    }

    pub fn state_report(&self) -> Report {
        Report::State { state: self.state }
    }
}

fn clamp_u16(value: i64) -> u16 {
    value.clamp(0, i64::from(u16::MAX)) as u16
}
