//! Poll scheduler.
//!
//! Decides, once per poll tick and only while no command is outstanding, what
//! the bridge does next. Pending local changes (charger on/off, backlight)
//! always go first and hold the phase where it is. Otherwise the phase
//! sequence runs:
//!
//! ```text
//! ReadSettings -> ReadState -> ReadPower -> ReadTemperature -> ReadEnergy
//!                                  ^                               |
//!                                  +------------ (loop) -----------+
//!                                  |                               |
//!                                  +-- ApplyLimit <-- limit changed+
//!                                  |                               |
//!                                  +-- Announce* <-- Settle x10 <--+ first time connected
//! ```
//!
//! [`SchedulerState::step`] is a pure transition function; the session turns
//! the returned [`PollAction`]s into frames, reports and timers.

use evse_rapi::{Command, CommandArgs, OutgoingFrame};

use crate::settings::Settings;

/// Number of poll ticks to wait after connecting before announcing values.
pub const SETTLE_TICKS: u8 = 10;

/// Position in the poll sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    ReadSettings,
    ReadState,
    ReadPower,
    ReadTemperature,
    ReadEnergy,
    /// Waiting for the network to settle; `tick` runs 0 to 9.
    ConnectedSettle { tick: u8 },
    AnnounceEnergy,
    AnnouncePower,
    AnnounceTemperature,
    AnnounceState,
    ApplyLimit,
}

impl PollPhase {
    /// Conventional phase number, as used in logs.
    pub fn number(self) -> u8 {
        match self {
            PollPhase::ReadSettings => 0,
            PollPhase::ReadState => 1,
            PollPhase::ReadPower => 10,
            PollPhase::ReadTemperature => 11,
            PollPhase::ReadEnergy => 12,
            PollPhase::ConnectedSettle { tick } => 20 + tick,
            PollPhase::AnnounceEnergy => 30,
            PollPhase::AnnouncePower => 31,
            PollPhase::AnnounceTemperature => 32,
            PollPhase::AnnounceState => 33,
            PollPhase::ApplyLimit => 40,
        }
    }
}

/// What the scheduler needs to know about the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInputs {
    /// Commanded charger on/off.
    pub on_off: bool,
    /// Desired backlight.
    pub backlight_on: bool,
    /// Desired energy limit.
    pub energy_limit: u32,
    /// Whether the host is connected to its network.
    pub connected: bool,
}

/// Effect of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Send a command to the charger.
    Send(OutgoingFrame),
    /// Record current power values as the last reported ones.
    SnapshotPower,
    ReportEnergy,
    ReportPower,
    ReportTemperature,
    ReportState,
    /// Start the min/max reporting timers.
    ArmReportTimers,
    /// Store the applied energy limit.
    PersistLimit(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub phase: PollPhase,
    /// Set while the values have not yet been announced on the current connection.
    pub first_time: bool,
    pub last_on_off: bool,
    pub last_backlight: bool,
    pub last_limit: u32,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState {
            phase: PollPhase::ReadSettings,
            first_time: true,
            last_on_off: false,
            last_backlight: true,
            last_limit: 0,
        }
    }
}

impl SchedulerState {
    /// Record that the charger is already in the given on/off state, so no
    /// ENABLE/SLEEP is needed to get it there.
    pub fn sync_on_off(&mut self, on_off: bool) {
        self.last_on_off = on_off;
    }

    /// Run one poll tick.
    pub fn step(mut self, inputs: &PollInputs) -> (SchedulerState, Vec<PollAction>) {
        if inputs.on_off != self.last_on_off {
            self.last_on_off = inputs.on_off;
            let command = if inputs.on_off { Command::Enable } else { Command::Sleep };
            return (self, vec![PollAction::Send(OutgoingFrame::bare(command))]);
        }
        if inputs.backlight_on != self.last_backlight {
            self.last_backlight = inputs.backlight_on;
            let command = if inputs.backlight_on { Command::LcdRgb } else { Command::LcdOff };
            return (self, vec![PollAction::Send(OutgoingFrame::bare(command))]);
        }

        let mut actions = Vec::new();
        let next = match self.phase {
            PollPhase::ReadSettings => {
                actions.push(send(Command::GetSettings));
                PollPhase::ReadState
            }
            PollPhase::ReadState => {
                actions.push(send(Command::GetState));
                PollPhase::ReadPower
            }
            PollPhase::ReadPower => {
                actions.push(send(Command::GetPower));
                PollPhase::ReadTemperature
            }
            PollPhase::ReadTemperature => {
                actions.push(send(Command::GetTemp));
                PollPhase::ReadEnergy
            }
            PollPhase::ReadEnergy => {
                actions.push(send(Command::GetEnergy));
                if !inputs.connected {
                    self.first_time = true;
                }
                if inputs.energy_limit != self.last_limit {
                    PollPhase::ApplyLimit
                } else if self.first_time {
                    PollPhase::ConnectedSettle { tick: 0 }
                } else {
                    PollPhase::ReadPower
                }
            }
            PollPhase::ConnectedSettle { tick: 0 } if !inputs.connected => PollPhase::ReadPower,
            PollPhase::ConnectedSettle { tick } if tick + 1 < SETTLE_TICKS => {
                PollPhase::ConnectedSettle { tick: tick + 1 }
            }
            PollPhase::ConnectedSettle { .. } => PollPhase::AnnounceEnergy,
            PollPhase::AnnounceEnergy => {
                actions.push(PollAction::ReportEnergy);
                PollPhase::AnnouncePower
            }
            PollPhase::AnnouncePower => {
                actions.push(PollAction::SnapshotPower);
                actions.push(PollAction::ReportPower);
                PollPhase::AnnounceTemperature
            }
            PollPhase::AnnounceTemperature => {
                actions.push(PollAction::ReportTemperature);
                PollPhase::AnnounceState
            }
            PollPhase::AnnounceState => {
                actions.push(PollAction::ReportState);
                actions.push(PollAction::ArmReportTimers);
                self.first_time = false;
                PollPhase::ReadPower
            }
            PollPhase::ApplyLimit => {
                let limit = inputs.energy_limit;
                actions.push(PollAction::Send(OutgoingFrame::with_args(
                    Command::SetLimit,
                    CommandArgs::one(Settings::limit_argument(limit)),
                )));
                actions.push(PollAction::PersistLimit(limit));
                self.last_limit = limit;
                PollPhase::ReadPower
            }
        };
        self.phase = next;
        (self, actions)
    }
}

fn send(command: Command) -> PollAction {
    PollAction::Send(OutgoingFrame::bare(command))
}
