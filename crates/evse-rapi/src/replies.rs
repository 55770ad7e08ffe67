//! Frames received from the charger.
//!
//! A validated frame is either an unsolicited push (`ST <hex>` or `WF...`),
//! an acknowledgement (`OK <fields>`) answering the pending command, or
//! anything else, which counts as a negative acknowledgement. Acknowledged
//! fields are parsed per command into raw readings; unit scaling is left to
//! whoever owns the measurement state.

use log::debug;

use crate::codec::ValidatedFrame;
use crate::commands::Command;
use crate::error::{RapiError, RapiResult};

/// Sentinel the charger reports for a reading it could not take.
pub const UNAVAILABLE: i64 = -1;

/// Charger state reported when the charger has been put to sleep.
pub const STATE_SLEEPING: u16 = 0xFE;

/// How a validated frame relates to the command/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Unsolicited state change.
    StatePush,
    /// Unsolicited request to reset the host side of the link.
    LinkReset,
    /// Acknowledgement of the pending command.
    Ack,
    /// Anything else.
    Nak,
}

/// Classify a validated frame by its leading token.
pub fn classify(frame: &ValidatedFrame) -> FrameKind {
    if frame.starts_with(Command::State.mnemonic()) {
        FrameKind::StatePush
    } else if frame.starts_with(Command::Wifi.mnemonic()) {
        FrameKind::LinkReset
    } else if frame.is_ack() {
        FrameKind::Ack
    } else {
        FrameKind::Nak
    }
}

/// Parse the hexadecimal state carried by an `ST` push.
pub fn parse_state_push(frame: &ValidatedFrame) -> RapiResult<u16> {
    let mut fields = frame.fields();
    parse_hex(Command::State, "state", fields.next())
}

/// Current and voltage, in milliamps and millivolts.
///
/// `None` means the charger reported the [`UNAVAILABLE`] sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReading {
    pub milliamps: Option<i64>,
    pub millivolts: Option<i64>,
}

/// Readings from the three temperature sensors, in tenths of a degree C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureReading {
    pub ds3231_tenths: i64,
    pub mcp9808_tenths: i64,
    pub tmp007_tenths: i64,
}

/// Energy delivered this session and in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyReading {
    /// Energy delivered in the current session, in watt-seconds.
    pub session_watt_seconds: i64,
    /// Lifetime accumulated energy, in watt-hours.
    pub accumulated_watt_hours: i64,
}

/// Current capacity and settings flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsReading {
    pub amps: i64,
    pub flags: i64,
}

impl SettingsReading {
    /// Service level: 2 when bit 0 of the flags is set, 1 otherwise.
    pub fn power_level(&self) -> u8 {
        if self.flags & 1 != 0 {
            2
        } else {
            1
        }
    }
}

/// A parsed acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Power(PowerReading),
    Temperature(TemperatureReading),
    Energy(EnergyReading),
    State(u16),
    Settings(SettingsReading),
    /// Acknowledgement of a command whose reply carries nothing we use.
    Done,
}

impl Reply {
    /// Parse the fields of an `OK` frame answering `command`.
    pub fn parse(command: Command, frame: &ValidatedFrame) -> RapiResult<Reply> {
        let mut fields = frame.fields();
        let reply = match command {
            Command::GetPower => {
                let amps = parse_decimal(command, "amps", fields.next())?;
                let volts = parse_decimal(command, "volts", fields.next())?;
                Reply::Power(PowerReading {
                    milliamps: available(amps),
                    millivolts: available(volts),
                })
            }
            Command::GetTemp => Reply::Temperature(TemperatureReading {
                ds3231_tenths: parse_decimal(command, "ds3231", fields.next())?,
                mcp9808_tenths: parse_decimal(command, "mcp9808", fields.next())?,
                tmp007_tenths: parse_decimal(command, "tmp007", fields.next())?,
            }),
            Command::GetEnergy => Reply::Energy(EnergyReading {
                session_watt_seconds: parse_decimal(command, "watt_seconds", fields.next())?,
                accumulated_watt_hours: parse_decimal(command, "watt_hours", fields.next())?,
            }),
            // An unreadable state still completes the exchange; the old value stands.
            Command::GetState => match parse_hex(command, "state", fields.next()) {
                Ok(state) => Reply::State(state),
                Err(e) => {
                    debug!("Keeping previous state: {}", e);
                    Reply::Done
                }
            },
            Command::GetSettings => Reply::Settings(SettingsReading {
                amps: parse_decimal(command, "amps", fields.next())?,
                flags: parse_decimal(command, "flags", fields.next())?,
            }),
            _ => Reply::Done,
        };
        Ok(reply)
    }
}

fn available(value: i64) -> Option<i64> {
    (value != UNAVAILABLE).then_some(value)
}

fn parse_decimal(command: Command, field: &'static str, token: Option<&str>) -> RapiResult<i64> {
    let token = token.ok_or(RapiError::MissingField { command, field })?;
    token.parse().map_err(|_| RapiError::InvalidField {
        command,
        field,
        value: token.to_string(),
    })
}

fn parse_hex(command: Command, field: &'static str, token: Option<&str>) -> RapiResult<u16> {
    let token = token.ok_or(RapiError::MissingField { command, field })?;
    u16::from_str_radix(token, 16).map_err(|_| RapiError::InvalidField {
        command,
        field,
        value: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{checksum, validate_checksum, CHECKSUM_MARK};
    use crate::hex;

    fn frame(body: &str) -> ValidatedFrame {
        let mut candidate = body.as_bytes().to_vec();
        let chk = b'$' ^ checksum(body.as_bytes());
        candidate.push(CHECKSUM_MARK);
        candidate.extend_from_slice(&hex::u8_to_hex(chk));
        validate_checksum(&candidate).unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&frame("ST 3")), FrameKind::StatePush);
        assert_eq!(classify(&frame("WF 1")), FrameKind::LinkReset);
        assert_eq!(classify(&frame("OK 1 2")), FrameKind::Ack);
        assert_eq!(classify(&frame("NK")), FrameKind::Nak);
    }

    #[test]
    fn test_state_push() {
        assert_eq!(parse_state_push(&frame("ST FE")).unwrap(), STATE_SLEEPING);
        assert_eq!(parse_state_push(&frame("ST a")).unwrap(), 0x0A);
        assert!(matches!(
            parse_state_push(&frame("ST")),
            Err(RapiError::MissingField { .. })
        ));
    }

    #[test]
    fn test_power_sentinels() {
        let reply = Reply::parse(Command::GetPower, &frame("OK -1 12000")).unwrap();
        assert_eq!(
            reply,
            Reply::Power(PowerReading { milliamps: None, millivolts: Some(12000) })
        );
        let reply = Reply::parse(Command::GetPower, &frame("OK 16000 -1")).unwrap();
        assert_eq!(
            reply,
            Reply::Power(PowerReading { milliamps: Some(16000), millivolts: None })
        );
    }

    #[test]
    fn test_power_missing_volts() {
        assert_eq!(
            Reply::parse(Command::GetPower, &frame("OK 16000")),
            Err(RapiError::MissingField { command: Command::GetPower, field: "volts" })
        );
    }

    #[test]
    fn test_temperature_requires_three_sensors() {
        let reply = Reply::parse(Command::GetTemp, &frame("OK 253 250 -2560")).unwrap();
        assert_eq!(
            reply,
            Reply::Temperature(TemperatureReading {
                ds3231_tenths: 253,
                mcp9808_tenths: 250,
                tmp007_tenths: -2560,
            })
        );
        assert!(Reply::parse(Command::GetTemp, &frame("OK 253 250")).is_err());
    }

    #[test]
    fn test_energy() {
        let reply = Reply::parse(Command::GetEnergy, &frame("OK 7200 500")).unwrap();
        assert_eq!(
            reply,
            Reply::Energy(EnergyReading { session_watt_seconds: 7200, accumulated_watt_hours: 500 })
        );
    }

    #[test]
    fn test_state_is_hex() {
        assert_eq!(Reply::parse(Command::GetState, &frame("OK 1f")).unwrap(), Reply::State(0x1F));
    }

    #[test]
    fn test_unreadable_state_still_completes() {
        assert_eq!(Reply::parse(Command::GetState, &frame("OK zz")).unwrap(), Reply::Done);
        assert_eq!(Reply::parse(Command::GetState, &frame("OK")).unwrap(), Reply::Done);
    }

    #[test]
    fn test_settings_power_level() {
        let Reply::Settings(settings) = Reply::parse(Command::GetSettings, &frame("OK 16 1")).unwrap() else {
            panic!("expected settings reply");
        };
        assert_eq!(settings.power_level(), 2);
        let Reply::Settings(settings) = Reply::parse(Command::GetSettings, &frame("OK 32 0")).unwrap() else {
            panic!("expected settings reply");
        };
        assert_eq!(settings.power_level(), 1);
    }

    #[test]
    fn test_commands_without_payload() {
        assert_eq!(Reply::parse(Command::Enable, &frame("OK")).unwrap(), Reply::Done);
        assert_eq!(Reply::parse(Command::SetLimit, &frame("OK")).unwrap(), Reply::Done);
    }
}
