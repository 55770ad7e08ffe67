//! Events delivered to a session and the actions it asks its driver to perform.

use std::time::Duration;

use crate::report::Report;
use crate::settings::Settings;

/// Timers owned by a session.
///
/// Ordering matters: deferred timers are replayed lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    Poll,
    CommandTimeout,
    Identify,
    BacklightOff,
    PowerMin,
    PowerMax,
    TempMax,
    EnergyMax,
}

impl TimerId {
    /// Timers whose handlers send a command and therefore wait for an idle link.
    pub fn needs_idle_link(self) -> bool {
        matches!(self, TimerId::Poll | TimerId::Identify | TimerId::BacklightOff)
    }
}

/// Target of an on/off command from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The charger itself (enable / sleep).
    Charger,
    /// The charger's display backlight.
    Backlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnOffCommand {
    On,
    Off,
    Toggle,
}

impl OnOffCommand {
    /// The new value given the current one.
    pub fn apply(self, current: bool) -> bool {
        match self {
            OnOffCommand::On => true,
            OnOffCommand::Off => false,
            OnOffCommand::Toggle => !current,
        }
    }
}

/// Input to [`Session::handle_event`](crate::Session::handle_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Raw bytes read from the serial link.
    SerialRx(Vec<u8>),
    /// A previously armed timer expired.
    Timer(TimerId),
    /// On/off request from the host.
    OnOff { endpoint: Endpoint, command: OnOffCommand },
    /// New energy limit in watt-hours; `0xFFFFFF` means unlimited.
    SetEnergyLimit(u32),
    /// The host's network connection came up or went down.
    NetworkStateChanged { connected: bool },
    /// Blink the display the given number of times.
    Identify { blinks: u16 },
}

/// Side effect requested by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes to the serial link.
    Transmit(Vec<u8>),
    /// Arm a timer, restarting it if already armed.
    StartTimer { timer: TimerId, after: Duration },
    StopTimer(TimerId),
    /// Deliver a value to the attribute layer.
    Report(Report),
    /// Store the settings so they survive a restart.
    PersistSettings(Settings),
    /// The charger asked for the host side to be reset.
    ResetLink,
}

/// Ordered collection of actions produced while handling events.
#[derive(Debug, Default)]
pub struct Outbox {
    actions: Vec<Action>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn transmit(&mut self, bytes: Vec<u8>) {
        self.push(Action::Transmit(bytes));
    }

    pub fn start_timer(&mut self, timer: TimerId, after: Duration) {
        self.push(Action::StartTimer { timer, after });
    }

    pub fn stop_timer(&mut self, timer: TimerId) {
        self.push(Action::StopTimer(timer));
    }

    pub fn report(&mut self, report: Report) {
        self.push(Action::Report(report));
    }

    /// Actions collected so far.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Take every collected action, leaving the outbox empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Action> {
        self.actions.drain(..)
    }
}
