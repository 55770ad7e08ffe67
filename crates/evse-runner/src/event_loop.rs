//! Single-threaded driver for a bridge session.
//!
//! All session state is touched from one thread. Link bytes and host commands
//! arrive over a channel; timers live in a deadline table consulted before
//! every wait. Each event is handled to completion, and its actions applied,
//! before the next one is looked at.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use evse_bridge::{Action, BridgeConfig, Event, Outbox, Session, Settings, TimerId};
use tracing::{debug, info, trace};

use crate::error::{RunnerError, RunnerResult};
use crate::report_sink::ReportSink;
use crate::settings_store::SettingsStore;

/// Longest wait between stop flag checks.
const MAX_WAIT: Duration = Duration::from_millis(250);

/// Input delivered to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Bytes read from the link.
    Link(Vec<u8>),
    /// The link reader stopped.
    LinkClosed(String),
    /// Command from the host.
    Host(Event),
}

// ============================================================================
// Timer Table
// ============================================================================

/// Armed timers and their deadlines.
#[derive(Debug, Default)]
pub struct TimerTable {
    deadlines: BTreeMap<TimerId, Instant>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `timer`, replacing any earlier deadline.
    pub fn arm(&mut self, timer: TimerId, deadline: Instant) {
        self.deadlines.insert(timer, deadline);
    }

    /// Arm `timer` to expire `after` from `now`.
    pub fn arm_after(&mut self, timer: TimerId, now: Instant, after: Duration) -> RunnerResult<()> {
        let deadline = now
            .checked_add(after)
            .ok_or_else(|| RunnerError::Config(format!("{timer:?} delay {after:?} is out of range")))?;
        self.arm(timer, deadline);
        Ok(())
    }

    pub fn cancel(&mut self, timer: TimerId) {
        self.deadlines.remove(&timer);
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.deadlines.contains_key(&timer)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(timer, deadline)| (*deadline, *timer))
            .collect();
        due.sort();
        for (_, timer) in &due {
            self.deadlines.remove(timer);
        }
        due.into_iter().map(|(_, timer)| timer).collect()
    }
}

// ============================================================================
// Event Loop
// ============================================================================

pub struct EventLoop<W, S, R> {
    config: BridgeConfig,
    session: Session,
    timers: TimerTable,
    link: W,
    store: S,
    sink: R,
}

impl<W, S, R> EventLoop<W, S, R>
where
    W: Write,
    S: SettingsStore,
    R: ReportSink,
{
    /// Create a session from the stored settings and arm its first poll.
    pub fn new(config: BridgeConfig, link: W, store: S, sink: R) -> RunnerResult<Self> {
        let settings = store.load()?;
        let session = Session::new(config.clone(), settings)?;
        let mut event_loop = EventLoop {
            config,
            session,
            timers: TimerTable::new(),
            link,
            store,
            sink,
        };
        event_loop.start_session()?;
        Ok(event_loop)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    pub fn link(&self) -> &W {
        &self.link
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Run until `stop` is set or the link closes.
    pub fn run(&mut self, rx: &Receiver<Input>, stop: &AtomicBool) -> RunnerResult<()> {
        info!("Bridge[{}]: Event loop running", self.config.name);
        while !stop.load(Ordering::Relaxed) {
            self.fire_expired(Instant::now())?;

            let wait = self
                .timers
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT));
            match rx.recv_timeout(wait) {
                Ok(input) => self.handle_input(input)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(RunnerError::LinkClosed("input channel disconnected".into()))
                }
            }
        }
        info!("Bridge[{}]: Stopping", self.config.name);
        Ok(())
    }

    /// Handle one input from the channel.
    pub fn handle_input(&mut self, input: Input) -> RunnerResult<()> {
        match input {
            Input::Link(bytes) => self.dispatch(Event::SerialRx(bytes)),
            Input::Host(event) => self.dispatch(event),
            Input::LinkClosed(reason) => Err(RunnerError::LinkClosed(reason)),
        }
    }

    /// Fire every timer due at `now`.
    pub fn fire_expired(&mut self, now: Instant) -> RunnerResult<()> {
        for timer in self.timers.pop_expired(now) {
            trace!("Bridge[{}]: Timer {:?} expired", self.config.name, timer);
            self.dispatch(Event::Timer(timer))?;
        }
        Ok(())
    }

    /// Feed one event to the session and carry out its actions.
    pub fn dispatch(&mut self, event: Event) -> RunnerResult<()> {
        let mut out = Outbox::new();
        self.session.handle_event(&event, &mut out)?;
        self.apply(out)
    }

    fn apply(&mut self, mut out: Outbox) -> RunnerResult<()> {
        let mut reset = false;
        for action in out.drain() {
            match action {
                Action::Transmit(bytes) => {
                    self.link.write_all(&bytes)?;
                    self.link.flush()?;
                }
                Action::StartTimer { timer, after } => {
                    self.timers.arm_after(timer, Instant::now(), after)?
                }
                Action::StopTimer(timer) => self.timers.cancel(timer),
                Action::Report(report) => self.sink.deliver(&report)?,
                Action::PersistSettings(settings) => self.store.save(&settings)?,
                Action::ResetLink => reset = true,
            }
        }
        if reset {
            self.reset_session()?;
        }
        Ok(())
    }

    fn start_session(&mut self) -> RunnerResult<()> {
        let mut out = Outbox::new();
        self.session.start(&mut out);
        self.apply(out)
    }

    /// Forget stored settings and start over with a fresh session.
    fn reset_session(&mut self) -> RunnerResult<()> {
        info!("Bridge[{}]: Resetting session and clearing settings", self.config.name);
        self.store.clear()?;
        self.timers.clear();
        self.session = Session::new(self.config.clone(), Settings::default())?;
        debug!("Bridge[{}]: Session rebuilt", self.config.name);
        self.start_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings_store::MemorySettingsStore;
    use evse_bridge::{Endpoint, OnOffCommand, Report};

    type TestLoop = EventLoop<Vec<u8>, MemorySettingsStore, Vec<Report>>;

    fn event_loop() -> TestLoop {
        EventLoop::new(BridgeConfig::default(), Vec::new(), MemorySettingsStore::default(), Vec::new()).unwrap()
    }

    #[test]
    fn test_timer_table_order() {
        let now = Instant::now();
        let mut timers = TimerTable::new();
        timers.arm(TimerId::TempMax, now + Duration::from_millis(5));
        timers.arm(TimerId::Poll, now + Duration::from_millis(10));
        timers.arm(TimerId::PowerMax, now + Duration::from_millis(1));
        timers.arm(TimerId::EnergyMax, now + Duration::from_secs(60));

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(1)));
        let due = timers.pop_expired(now + Duration::from_millis(10));
        assert_eq!(due, vec![TimerId::PowerMax, TimerId::TempMax, TimerId::Poll]);
        assert!(timers.is_armed(TimerId::EnergyMax));
        assert!(!timers.is_armed(TimerId::Poll));
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let now = Instant::now();
        let mut timers = TimerTable::new();
        timers.arm(TimerId::Poll, now);
        timers.arm(TimerId::Poll, now + Duration::from_secs(1));
        assert!(timers.pop_expired(now).is_empty());
        timers.cancel(TimerId::Poll);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_arm_after_rejects_unrepresentable_deadline() {
        let now = Instant::now();
        let mut timers = TimerTable::new();
        assert!(matches!(
            timers.arm_after(TimerId::EnergyMax, now, Duration::MAX),
            Err(RunnerError::Config(_))
        ));
        assert!(!timers.is_armed(TimerId::EnergyMax));

        timers.arm_after(TimerId::Poll, now, Duration::from_millis(200)).unwrap();
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(200)));
    }

    #[test]
    fn test_new_arms_startup_poll() {
        let event_loop = event_loop();
        let deadline = event_loop.timers().next_deadline().unwrap();
        assert!(deadline > Instant::now() + Duration::from_secs(5));
        assert!(event_loop.timers().is_armed(TimerId::Poll));
    }

    #[test]
    fn test_poll_writes_to_link() {
        let mut event_loop = event_loop();
        event_loop.dispatch(Event::Timer(TimerId::Poll)).unwrap();
        assert_eq!(event_loop.link(), b"$GE^62\r");
        assert!(event_loop.timers().is_armed(TimerId::CommandTimeout));

        event_loop.handle_input(Input::Link(b"$OK 16 1^61\r".to_vec())).unwrap();
        assert!(!event_loop.timers().is_armed(TimerId::CommandTimeout));
        assert_eq!(event_loop.session().measurements().power_level, 2);
    }

    #[test]
    fn test_fire_expired_dispatches() {
        let mut event_loop = event_loop();
        event_loop.fire_expired(Instant::now() + Duration::from_secs(7)).unwrap();
        assert_eq!(event_loop.link(), b"$GE^62\r");
    }

    #[test]
    fn test_state_push_reaches_sink() {
        let mut event_loop = event_loop();
        event_loop.handle_input(Input::Link(b"$ST FE^00\r".to_vec())).unwrap();
        assert_eq!(event_loop.sink(), &vec![Report::State { state: 0xFE }]);
    }

    #[test]
    fn test_backlight_persisted() {
        let mut event_loop = event_loop();
        event_loop
            .handle_input(Input::Host(Event::OnOff {
                endpoint: Endpoint::Backlight,
                command: OnOffCommand::Off,
            }))
            .unwrap();
        assert_eq!(event_loop.store().saves, 1);
        assert_eq!(event_loop.store().settings.map(|s| s.backlight_on), Some(false));
    }

    #[test]
    fn test_link_reset_rebuilds_session() {
        let store = MemorySettingsStore {
            settings: Some(Settings { backlight_on: false, energy_limit: 100 }),
            saves: 0,
        };
        let mut event_loop: TestLoop =
            EventLoop::new(BridgeConfig::default(), Vec::new(), store, Vec::new()).unwrap();
        assert!(!event_loop.session().settings().backlight_on);

        event_loop.handle_input(Input::Link(b"$WF^53\r".to_vec())).unwrap();
        assert_eq!(event_loop.store().settings, None);
        assert_eq!(event_loop.session().settings(), Settings::default());
        assert!(event_loop.timers().is_armed(TimerId::Poll));
    }

    #[test]
    fn test_link_closed_is_an_error() {
        let mut event_loop = event_loop();
        let result = event_loop.handle_input(Input::LinkClosed("gone".into()));
        assert!(matches!(result, Err(RunnerError::LinkClosed(_))));
    }

    #[test]
    fn test_run_stops_on_flag() {
        let mut event_loop = event_loop();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let stop = AtomicBool::new(true);
        event_loop.run(&rx, &stop).unwrap();
    }
}
