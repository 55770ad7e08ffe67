//! Integration tests driving a [`Session`] against a scripted charger.
//!
//! The harness plays the part of the runner: it feeds events to the session,
//! records every action, and keeps a table of armed timers so tests can fire
//! them by hand. Nothing here touches a real serial port or clock.

use std::collections::BTreeMap;
use std::time::Duration;

use evse_bridge::{
    Action, BridgeConfig, CorrelatorState, Endpoint, Event, OnOffCommand, Outbox, PollPhase, Report,
    Session, Settings, TimerId, LEVEL1_NOMINAL_VOLTS, LEVEL2_NOMINAL_VOLTS,
};
use evse_rapi::{checksum, hex, Command, CHECKSUM_MARK, FRAME_END, FRAME_START};

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    session: Session,
    sent: Vec<Vec<u8>>,
    reports: Vec<Report>,
    persisted: Vec<Settings>,
    resets: usize,
    armed: BTreeMap<TimerId, Duration>,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    fn with_settings(settings: Settings) -> Self {
        let session = Session::new(BridgeConfig::default(), settings).expect("valid config");
        let mut harness = Harness {
            session,
            sent: Vec::new(),
            reports: Vec::new(),
            persisted: Vec::new(),
            resets: 0,
            armed: BTreeMap::new(),
        };
        let mut out = Outbox::new();
        harness.session.start(&mut out);
        harness.apply(out);
        harness
    }

    fn event(&mut self, event: Event) {
        let mut out = Outbox::new();
        self.session.handle_event(&event, &mut out).expect("event handled");
        self.apply(out);
    }

    fn apply(&mut self, mut out: Outbox) {
        for action in out.drain() {
            match action {
                Action::Transmit(bytes) => self.sent.push(bytes),
                Action::StartTimer { timer, after } => {
                    self.armed.insert(timer, after);
                }
                Action::StopTimer(timer) => {
                    self.armed.remove(&timer);
                }
                Action::Report(report) => self.reports.push(report),
                Action::PersistSettings(settings) => self.persisted.push(settings),
                Action::ResetLink => self.resets += 1,
            }
        }
    }

    /// Fire an armed timer, as the runner would on expiry.
    fn fire(&mut self, timer: TimerId) {
        assert!(self.armed.remove(&timer).is_some(), "{timer:?} was not armed");
        self.event(Event::Timer(timer));
    }

    /// Deliver a frame from the charger with a correct checksum.
    fn reply(&mut self, body: &str) {
        self.event(Event::SerialRx(frame(body)));
    }

    /// Frames transmitted since the last call, as text.
    fn take_sent(&mut self) -> Vec<String> {
        self.sent
            .drain(..)
            .map(|bytes| String::from_utf8(bytes).expect("ascii frame"))
            .collect()
    }

    fn take_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.reports)
    }

    /// Poll once and answer the command it sends.
    fn poll_and_reply(&mut self, body: &str) -> String {
        self.fire(TimerId::Poll);
        let sent = self.take_sent();
        assert_eq!(sent.len(), 1, "expected one command, got {sent:?}");
        self.reply(body);
        sent.into_iter().next().unwrap_or_default()
    }

    /// Run the settings/state bootstrap and one full poll cycle.
    fn bootstrap(&mut self) {
        self.poll_and_reply("OK 16 0");
        self.poll_and_reply("OK 3");
        self.poll_and_reply("OK 16000 240000");
        self.poll_and_reply("OK 253 250 0");
        self.poll_and_reply("OK 7200 500");
    }
}

fn frame(body: &str) -> Vec<u8> {
    let mut bytes = vec![FRAME_START];
    bytes.extend_from_slice(body.as_bytes());
    let chk = checksum(&bytes);
    bytes.push(CHECKSUM_MARK);
    bytes.extend_from_slice(&hex::u8_to_hex(chk));
    bytes.push(FRAME_END);
    bytes
}

fn wire(body: &str) -> String {
    String::from_utf8(frame(body)).unwrap_or_default()
}

// ============================================================================
// Poll Cycle
// ============================================================================

#[test]
fn test_startup_delay_then_bootstrap() {
    let mut h = Harness::new();
    assert_eq!(h.armed.get(&TimerId::Poll), Some(&Duration::from_millis(6000)));

    assert_eq!(h.poll_and_reply("OK 16 0"), wire("GE"));
    assert_eq!(h.poll_and_reply("OK 3"), wire("GS"));
    assert_eq!(h.poll_and_reply("OK 16000 240000"), wire("GG"));
    assert_eq!(h.poll_and_reply("OK 253 250 0"), wire("GP"));
    assert_eq!(h.poll_and_reply("OK 7200 500"), wire("GU"));

    let m = h.session.measurements();
    assert_eq!(m.state, 3);
    assert_eq!(m.volts, 2400);
    assert_eq!(m.amps, 160);
    assert_eq!(m.watts, 384);
    assert_eq!(m.temperature_c, 25);
    assert_eq!(h.armed.get(&TimerId::Poll), Some(&Duration::from_millis(200)));
}

#[test]
fn test_energy_reply() {
    let mut h = Harness::new();
    h.bootstrap();
    let m = h.session.measurements();
    assert_eq!(m.energy_demand_wh, 2);
    assert_eq!(m.energy_sum_wh, 500);
}

#[test]
fn test_unreadable_state_reply_completes_without_resend() {
    let mut h = Harness::new();
    h.poll_and_reply("OK 16 0");
    let before = h.session.measurements().state;

    assert_eq!(h.poll_and_reply("OK zz"), wire("GS"));
    assert!(h.take_sent().is_empty());
    assert_eq!(h.session.correlator_state(), CorrelatorState::Idle);
    assert!(!h.armed.contains_key(&TimerId::CommandTimeout));
    assert_eq!(h.session.measurements().state, before);

    assert_eq!(h.poll_and_reply("OK 16000 240000"), wire("GG"));
}

#[test]
fn test_default_limit_applied_as_zero_after_first_cycle() {
    let mut h = Harness::new();
    h.bootstrap();
    assert_eq!(h.session.phase(), PollPhase::ApplyLimit);

    assert_eq!(h.poll_and_reply("OK"), wire("SH 0"));
    assert_eq!(h.persisted, vec![Settings::default()]);
    assert_eq!(h.session.phase(), PollPhase::ReadPower);

    // Not connected: the cycle runs GG, GP, GU, then detours to the settle
    // phase, which falls straight back to polling.
    assert_eq!(h.poll_and_reply("OK 16000 240000"), wire("GG"));
    assert_eq!(h.poll_and_reply("OK 253 250 0"), wire("GP"));
    assert_eq!(h.poll_and_reply("OK 7200 500"), wire("GU"));
    assert_eq!(h.session.phase(), PollPhase::ConnectedSettle { tick: 0 });
    h.fire(TimerId::Poll);
    assert!(h.take_sent().is_empty());
    assert_eq!(h.session.phase(), PollPhase::ReadPower);
}

#[test]
fn test_new_energy_limit() {
    let mut h = Harness::with_settings(Settings { backlight_on: true, energy_limit: 0 });
    h.bootstrap();
    // First pass detours through the settle phase.
    h.fire(TimerId::Poll);
    assert!(h.take_sent().is_empty());

    h.event(Event::SetEnergyLimit(12345));
    // Limit changes are only picked up after the next energy read.
    assert_eq!(h.poll_and_reply("OK 1 1"), wire("GG"));
    assert_eq!(h.poll_and_reply("OK 1 1 1"), wire("GP"));
    assert_eq!(h.poll_and_reply("OK 1 1"), wire("GU"));
    assert_eq!(h.poll_and_reply("OK"), wire("SH 12345"));
    assert_eq!(h.persisted.last().map(|s| s.energy_limit), Some(12345));
}

#[test]
fn test_oversized_energy_limit_sent_as_unlimited() {
    let mut h = Harness::with_settings(Settings { backlight_on: true, energy_limit: 0 });
    h.bootstrap();
    h.fire(TimerId::Poll);
    assert!(h.take_sent().is_empty());

    h.event(Event::SetEnergyLimit(u32::MAX));
    assert_eq!(h.poll_and_reply("OK 1 1"), wire("GG"));
    assert_eq!(h.poll_and_reply("OK 1 1 1"), wire("GP"));
    assert_eq!(h.poll_and_reply("OK 1 1"), wire("GU"));
    assert_eq!(h.poll_and_reply("OK"), wire("SH 0"));
}

#[test]
fn test_poll_deferred_until_reply() {
    let mut h = Harness::new();
    h.fire(TimerId::Poll);
    assert_eq!(h.take_sent(), vec![wire("GE")]);

    // Poll tick expires before the charger answers.
    h.fire(TimerId::Poll);
    assert!(h.take_sent().is_empty());
    assert!(!h.armed.contains_key(&TimerId::Poll));

    h.reply("OK 16 0");
    assert_eq!(h.take_sent(), vec![wire("GS")]);
    assert!(h.armed.contains_key(&TimerId::Poll));
}

// ============================================================================
// Replies and Pushes
// ============================================================================

#[test]
fn test_settings_reply_sets_power_level() {
    let mut h = Harness::new();
    h.poll_and_reply("OK 16 1");
    assert_eq!(h.session.measurements().power_level, 2);
    assert_eq!(h.session.measurements().capacity_amps, 16);
}

#[test]
fn test_missing_volts_falls_back_to_nominal() {
    let mut h = Harness::new();
    h.poll_and_reply("OK 16 0");
    h.poll_and_reply("OK 3");
    h.poll_and_reply("OK 12000 -1");
    assert_eq!(h.session.measurements().volts, LEVEL1_NOMINAL_VOLTS);
    assert_eq!(h.session.measurements().amps, 120);

    let mut h = Harness::new();
    h.poll_and_reply("OK 16 1");
    h.poll_and_reply("OK 3");
    h.poll_and_reply("OK 12000 -1");
    assert_eq!(h.session.measurements().volts, LEVEL2_NOMINAL_VOLTS);
}

#[test]
fn test_missing_amps_keeps_previous_reading() {
    let mut h = Harness::new();
    h.bootstrap();
    h.poll_and_reply("OK");
    h.poll_and_reply("OK -1 12000");
    let m = h.session.measurements();
    assert_eq!(m.amps, 160);
    assert_eq!(m.volts, 120);
}

#[test]
fn test_state_push_turns_charger_off_and_reports() {
    let mut h = Harness::new();
    h.event(Event::OnOff { endpoint: Endpoint::Charger, command: OnOffCommand::On });
    h.poll_and_reply("OK");
    assert!(h.session.measurements().on_off);

    // A command is outstanding when the push arrives.
    h.fire(TimerId::Poll);
    h.take_sent();
    h.reply("ST FE");

    assert!(!h.session.measurements().on_off);
    assert_eq!(h.take_reports(), vec![Report::State { state: 0xFE }]);
    assert_eq!(
        h.session.correlator_state(),
        CorrelatorState::AwaitingReply { command: Command::GetSettings, resend_count: 0 }
    );

    // The charger is already asleep, so no SLEEP is sent.
    h.reply("OK 16 0");
    h.fire(TimerId::Poll);
    assert_eq!(h.take_sent(), vec![wire("GS")]);
}

#[test]
fn test_state_push_restores_dark_display() {
    let mut h = Harness::with_settings(Settings { backlight_on: false, energy_limit: 0 });
    h.reply("ST 3");
    assert_eq!(h.armed.get(&TimerId::BacklightOff), Some(&Duration::from_millis(5000)));
    h.fire(TimerId::BacklightOff);
    assert_eq!(h.take_sent(), vec![wire("FB 0")]);
}

#[test]
fn test_link_reset_push() {
    let mut h = Harness::new();
    h.reply("WF 1");
    assert_eq!(h.resets, 1);
}

#[test]
fn test_noise_and_split_delivery() {
    let mut h = Harness::new();
    h.fire(TimerId::Poll);
    h.take_sent();

    let bytes = frame("OK 16 1");
    let (head, tail) = bytes.split_at(5);
    let mut first = b"\xff\x00garbage".to_vec();
    first.extend_from_slice(head);
    h.event(Event::SerialRx(first));
    assert_eq!(h.session.measurements().power_level, 1);
    h.event(Event::SerialRx(tail.to_vec()));
    assert_eq!(h.session.measurements().power_level, 2);
}

// ============================================================================
// Retry Policy
// ============================================================================

#[test]
fn test_four_failures_abandon_command() {
    let mut h = Harness::new();
    h.fire(TimerId::Poll);
    assert_eq!(h.take_sent(), vec![wire("GE")]);

    h.fire(TimerId::CommandTimeout);
    assert_eq!(h.take_sent(), vec!["\r".to_string(), wire("GE")]);
    h.reply("NK");
    assert_eq!(h.take_sent(), vec!["\r".to_string(), wire("GE")]);
    h.event(Event::SerialRx(b"$OK 16 1^00\r".to_vec()));
    assert_eq!(h.take_sent(), vec!["\r".to_string(), wire("GE")]);

    h.fire(TimerId::CommandTimeout);
    assert!(h.take_sent().is_empty());
    assert_eq!(h.session.correlator_state(), CorrelatorState::Idle);
    assert!(!h.armed.contains_key(&TimerId::CommandTimeout));
}

#[test]
fn test_abandon_replays_deferred_poll() {
    let mut h = Harness::new();
    h.fire(TimerId::Poll);
    h.take_sent();
    h.fire(TimerId::Poll);

    for _ in 0..3 {
        h.fire(TimerId::CommandTimeout);
    }
    h.take_sent();
    h.fire(TimerId::CommandTimeout);
    assert_eq!(h.take_sent(), vec![wire("GS")]);
}

#[test]
fn test_resent_limit_loses_argument() {
    let mut h = Harness::with_settings(Settings { backlight_on: true, energy_limit: 12345 });
    h.bootstrap();
    h.fire(TimerId::Poll);
    assert_eq!(h.take_sent(), vec![wire("SH 12345")]);

    h.fire(TimerId::CommandTimeout);
    assert_eq!(h.take_sent(), vec!["\r".to_string(), wire("SH")]);
}

// ============================================================================
// Host Commands
// ============================================================================

#[test]
fn test_backlight_off_preempts_poll() {
    let mut h = Harness::new();
    h.bootstrap();
    h.event(Event::OnOff { endpoint: Endpoint::Backlight, command: OnOffCommand::Off });
    assert_eq!(h.persisted.last().map(|s| s.backlight_on), Some(false));

    assert_eq!(h.poll_and_reply("OK"), wire("FB 0"));
    assert_eq!(h.session.phase(), PollPhase::ApplyLimit);
}

#[test]
fn test_identify_blinks_then_restores() {
    let mut h = Harness::new();
    h.event(Event::Identify { blinks: 2 });

    let mut sent = Vec::new();
    while h.armed.contains_key(&TimerId::Identify) {
        h.fire(TimerId::Identify);
        sent.extend(h.take_sent());
        h.reply("OK");
    }
    assert_eq!(
        sent,
        vec![wire("FB 6"), wire("FB 0"), wire("FB 6"), wire("FB 0"), wire("S0 1")]
    );
    assert!(!h.session.is_identifying());
}

#[test]
fn test_identify_waits_for_idle_link() {
    let mut h = Harness::new();
    h.fire(TimerId::Poll);
    h.take_sent();
    h.event(Event::Identify { blinks: 1 });
    h.fire(TimerId::Identify);
    assert!(h.take_sent().is_empty());

    h.reply("OK 16 0");
    assert_eq!(h.take_sent(), vec![wire("FB 6")]);
}

// ============================================================================
// Reporting
// ============================================================================

#[test]
fn test_connected_announcement_arms_report_timers() {
    let mut h = Harness::with_settings(Settings { backlight_on: true, energy_limit: 0 });
    h.event(Event::NetworkStateChanged { connected: true });
    h.armed.remove(&TimerId::Identify);
    h.bootstrap();
    assert_eq!(h.session.phase(), PollPhase::ConnectedSettle { tick: 0 });

    for _ in 0..10 {
        h.fire(TimerId::Poll);
    }
    assert!(h.take_reports().is_empty());
    for _ in 0..4 {
        h.fire(TimerId::Poll);
    }
    assert!(h.take_sent().is_empty());
    assert_eq!(
        h.take_reports(),
        vec![
            Report::Energy { sum_wh: 500, demand_wh: 2 },
            Report::Power { volts: 2400, amps: 160, watts: 384 },
            Report::Temperature { celsius: 25 },
            Report::State { state: 3 },
        ]
    );
    for timer in [TimerId::PowerMin, TimerId::PowerMax, TimerId::TempMax, TimerId::EnergyMax] {
        assert!(h.armed.contains_key(&timer), "{timer:?} not armed");
    }
    assert_eq!(h.session.phase(), PollPhase::ReadPower);
}

#[test]
fn test_max_interval_always_reports() {
    let mut h = Harness::new();
    h.bootstrap();
    h.armed.insert(TimerId::PowerMax, Duration::ZERO);

    h.fire(TimerId::PowerMax);
    h.fire(TimerId::PowerMax);
    let power = Report::Power { volts: 2400, amps: 160, watts: 384 };
    assert_eq!(h.take_reports(), vec![power, power]);
    assert_eq!(h.armed.get(&TimerId::PowerMax), Some(&Duration::from_secs(60)));

    h.armed.insert(TimerId::TempMax, Duration::ZERO);
    h.fire(TimerId::TempMax);
    h.armed.insert(TimerId::EnergyMax, Duration::ZERO);
    h.fire(TimerId::EnergyMax);
    assert_eq!(
        h.take_reports(),
        vec![Report::Temperature { celsius: 25 }, Report::Energy { sum_wh: 500, demand_wh: 2 }]
    );
}

#[test]
fn test_min_interval_is_change_gated() {
    let mut h = Harness::new();
    h.bootstrap();
    h.armed.insert(TimerId::PowerMin, Duration::ZERO);

    // Nothing reported yet, so the first check sees a change.
    h.fire(TimerId::PowerMin);
    assert_eq!(h.take_reports().len(), 1);
    h.fire(TimerId::PowerMin);
    assert!(h.take_reports().is_empty());
    assert!(h.armed.contains_key(&TimerId::PowerMin));

    h.poll_and_reply("OK");
    h.poll_and_reply("OK 16000 230000");
    h.fire(TimerId::PowerMin);
    assert_eq!(h.take_reports(), vec![Report::Power { volts: 2300, amps: 160, watts: 368 }]);
}
