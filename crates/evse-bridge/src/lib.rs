//! OpenEVSE bridge engine.
//!
//! This crate holds the protocol engine that sits between a host controller
//! and an OpenEVSE charger: it decides which command to send next, correlates
//! replies with the command that is outstanding, retries failed exchanges,
//! and turns the charger's readings into reports for the attribute layer.
//!
//! The engine is sans-I/O. A driver feeds it [`Event`]s (bytes read from the
//! serial link, expired timers, host commands) through
//! [`Session::handle_event`] and carries out the [`Action`]s it leaves in an
//! [`Outbox`] (bytes to write, timers to arm, reports to deliver).
//!
//! # Example
//!
//! ```rust
//! use evse_bridge::{Action, BridgeConfig, Event, Outbox, Session, Settings, TimerId};
//!
//! let mut session = Session::new(BridgeConfig::default(), Settings::default()).unwrap();
//! let mut out = Outbox::new();
//! session.start(&mut out);
//!
//! // When the startup delay expires the first poll asks for the settings.
//! out.drain();
//! session.handle_event(&Event::Timer(TimerId::Poll), &mut out).unwrap();
//! assert_eq!(out.actions()[0], Action::Transmit(b"$GE^62\r".to_vec()));
//!
//! // The charger answers: level 2 service.
//! session.handle_event(&Event::SerialRx(b"$OK 16 1^61\r".to_vec()), &mut out).unwrap();
//! assert_eq!(session.measurements().power_level, 2);
//! ```

mod config;
mod correlator;
mod error;
mod event;
mod identify;
mod measurements;
mod report;
mod reporter;
mod scheduler;
mod session;
mod settings;

pub use config::{BridgeConfig, MAX_PERIOD_MS};
pub use correlator::{Correlator, CorrelatorState, FrameOutcome, RetryOutcome};
pub use error::{BridgeError, BridgeResult};
pub use event::{Action, Endpoint, Event, OnOffCommand, Outbox, TimerId};
pub use identify::{BlinkStep, IdentifyBlink};
pub use measurements::{MeasurementSet, DEFAULT_TEMPERATURE_C, LEVEL1_NOMINAL_VOLTS, LEVEL2_NOMINAL_VOLTS};
pub use report::{Report, ENERGY_DEMAND_MASK, ENERGY_SUM_MASK};
pub use reporter::{ChangeThresholds, PowerSnapshot, Reporter};
pub use scheduler::{PollAction, PollInputs, PollPhase, SchedulerState, SETTLE_TICKS};
pub use session::Session;
pub use settings::{Settings, UNLIMITED_ENERGY};
