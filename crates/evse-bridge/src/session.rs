//! The bridge session.
//!
//! A [`Session`] owns every piece of mutable bridge state: the frame
//! accumulator, the correlator, the poll scheduler, the measurements and the
//! reporter. It is driven one [`Event`] at a time and answers with
//! [`Action`](crate::Action)s in an [`Outbox`]; it never performs I/O or
//! reads a clock to make decisions.

use std::collections::BTreeSet;

use evse_metrics::{metric_defs, MetricLabels};
use evse_rapi::{Command, FrameAccumulator, OutgoingFrame};
use tracing::{debug, info, trace};

use crate::config::BridgeConfig;
use crate::correlator::{Correlator, CorrelatorState, FrameOutcome, RetryOutcome};
use crate::error::BridgeResult;
use crate::event::{Action, Endpoint, Event, Outbox, TimerId};
use crate::identify::{BlinkStep, IdentifyBlink};
use crate::measurements::MeasurementSet;
use crate::report::Report;
use crate::reporter::{ChangeThresholds, Reporter};
use crate::scheduler::{PollAction, PollInputs, PollPhase, SchedulerState};
use crate::settings::Settings;

// ============================================================================
// Session
// ============================================================================

#[derive(Debug)]
pub struct Session {
    config: BridgeConfig,
    labels: MetricLabels,
    accumulator: FrameAccumulator,
    correlator: Correlator,
    scheduler: SchedulerState,
    measurements: MeasurementSet,
    reporter: Reporter,
    settings: Settings,
    identify: IdentifyBlink,
    connected: bool,
    /// Timers that fired while a command was outstanding.
    deferred: BTreeSet<TimerId>,
}

impl Session {
    /// Create a session from its configuration and restored settings.
    pub fn new(config: BridgeConfig, settings: Settings) -> BridgeResult<Self> {
        config.validate()?;
        let measurements = MeasurementSet {
            backlight_on: settings.backlight_on,
            ..Default::default()
        };
        Ok(Session {
            labels: MetricLabels::new(config.name.clone()),
            accumulator: FrameAccumulator::new(),
            correlator: Correlator::new(config.name.clone(), config.command_timeout(), config.max_resends),
            scheduler: SchedulerState::default(),
            reporter: Reporter::new(ChangeThresholds::from_config(&config)),
            measurements,
            settings,
            identify: IdentifyBlink::default(),
            connected: false,
            deferred: BTreeSet::new(),
            config,
        })
    }

    /// Arm the first poll, leaving the charger time to boot.
    pub fn start(&mut self, out: &mut Outbox) {
        info!(
            "Bridge[{}]: Starting, first poll in {:?}",
            self.config.name,
            self.config.startup_delay()
        );
        out.start_timer(TimerId::Poll, self.config.startup_delay());
    }

    /// Process one event.
    pub fn handle_event(&mut self, event: &Event, out: &mut Outbox) -> BridgeResult<()> {
        match event {
            Event::SerialRx(bytes) => {
                for candidate in self.accumulator.push(bytes) {
                    self.on_frame(&candidate, out)?;
                }
            }
            Event::Timer(timer) => self.on_timer(*timer, out)?,
            Event::OnOff { endpoint: Endpoint::Charger, command } => {
                self.measurements.on_off = command.apply(self.measurements.on_off);
                debug!("Bridge[{}]: Charger commanded {}", self.config.name, on_off_str(self.measurements.on_off));
            }
            Event::OnOff { endpoint: Endpoint::Backlight, command } => {
                let backlight_on = command.apply(self.measurements.backlight_on);
                self.measurements.backlight_on = backlight_on;
                self.settings.backlight_on = backlight_on;
                debug!("Bridge[{}]: Backlight commanded {}", self.config.name, on_off_str(backlight_on));
                out.push(Action::PersistSettings(self.settings));
            }
            Event::SetEnergyLimit(limit) => {
                debug!("Bridge[{}]: Energy limit set to {}", self.config.name, limit);
                self.settings.energy_limit = *limit;
            }
            Event::NetworkStateChanged { connected } => {
                let joined = *connected && !self.connected;
                self.connected = *connected;
                if joined {
                    info!("Bridge[{}]: Network connected", self.config.name);
                    self.start_identify(self.config.identify_blinks, out);
                }
            }
            Event::Identify { blinks } => self.start_identify(*blinks, out),
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------------

    fn on_frame(&mut self, candidate: &[u8], out: &mut Outbox) -> BridgeResult<()> {
        let outcome = self.correlator.on_frame(candidate, out);
        match &outcome {
            FrameOutcome::Completed { reply, .. } => self.measurements.apply(reply),
            FrameOutcome::StatePush(state) => self.on_state_push(*state, out),
            FrameOutcome::LinkReset => {
                info!("Bridge[{}]: Charger requested a link reset", self.config.name);
                out.push(Action::ResetLink);
            }
            FrameOutcome::Failed { .. } | FrameOutcome::Ignored => {}
        }
        if outcome.freed_link() {
            self.drain_deferred(out)?;
        }
        Ok(())
    }

    fn on_state_push(&mut self, state: u16, out: &mut Outbox) {
        debug!("Bridge[{}]: State pushed: {:#04x}", self.config.name, state);
        metrics::counter!(metric_defs::STATE_PUSHES.name, &self.labels.to_labels()).increment(1);
        self.measurements.apply_state_push(state);
        self.scheduler.sync_on_off(self.measurements.on_off);
        self.emit(self.measurements.state_report(), out);
        // The charger lights its display on every state change.
        if !self.measurements.backlight_on {
            out.start_timer(TimerId::BacklightOff, self.config.backlight_restore());
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn on_timer(&mut self, timer: TimerId, out: &mut Outbox) -> BridgeResult<()> {
        if timer.needs_idle_link() && !self.correlator.is_idle() {
            trace!("Bridge[{}]: Deferring {:?} until the link is idle", self.config.name, timer);
            self.deferred.insert(timer);
            return Ok(());
        }
        match timer {
            TimerId::Poll => self.poll(out)?,
            TimerId::CommandTimeout => {
                if let RetryOutcome::Abandoned(_) = self.correlator.on_timeout(out) {
                    self.drain_deferred(out)?;
                }
            }
            TimerId::Identify => self.identify_step(out)?,
            TimerId::BacklightOff => {
                if !self.measurements.backlight_on {
                    self.correlator.send(OutgoingFrame::bare(Command::LcdOff), out)?;
                }
            }
            TimerId::PowerMin => {
                if self.reporter.on_min_interval(&self.measurements) {
                    self.report_power(out);
                }
                out.start_timer(TimerId::PowerMin, self.config.report_power_min());
            }
            TimerId::PowerMax => self.report_power(out),
            TimerId::TempMax => self.report_temperature(out),
            TimerId::EnergyMax => self.report_energy(out),
        }
        Ok(())
    }

    /// Replay deferred timers while the link stays idle.
    fn drain_deferred(&mut self, out: &mut Outbox) -> BridgeResult<()> {
        while self.correlator.is_idle() {
            let Some(timer) = self.deferred.pop_first() else {
                break;
            };
            self.on_timer(timer, out)?;
        }
        Ok(())
    }

    fn poll(&mut self, out: &mut Outbox) -> BridgeResult<()> {
        let inputs = PollInputs {
            on_off: self.measurements.on_off,
            backlight_on: self.measurements.backlight_on,
            energy_limit: self.settings.energy_limit,
            connected: self.connected,
        };
        let (next, actions) = self.scheduler.step(&inputs);
        if next.phase != self.scheduler.phase {
            trace!(
                "Bridge[{}]: Phase {} -> {}",
                self.config.name,
                self.scheduler.phase.number(),
                next.phase.number()
            );
        }
        self.scheduler = next;

        for action in actions {
            match action {
                PollAction::Send(frame) => self.correlator.send(frame, out)?,
                PollAction::SnapshotPower => self.reporter.snapshot(&self.measurements),
                PollAction::ReportEnergy => self.report_energy(out),
                PollAction::ReportPower => self.report_power(out),
                PollAction::ReportTemperature => self.report_temperature(out),
                PollAction::ReportState => self.emit(self.measurements.state_report(), out),
                PollAction::ArmReportTimers => self.arm_report_timers(out),
                PollAction::PersistLimit(limit) => {
                    debug!("Bridge[{}]: Energy limit {} applied", self.config.name, limit);
                    self.settings.energy_limit = limit;
                    out.push(Action::PersistSettings(self.settings));
                }
            }
        }
        out.start_timer(TimerId::Poll, self.config.poll_period());
        Ok(())
    }

    fn arm_report_timers(&self, out: &mut Outbox) {
        out.start_timer(TimerId::PowerMin, self.config.report_power_min());
        out.start_timer(TimerId::PowerMax, self.config.report_power_max());
        out.start_timer(TimerId::TempMax, self.config.report_temp_max());
        out.start_timer(TimerId::EnergyMax, self.config.report_energy_max());
    }

    // ------------------------------------------------------------------------
    // Identify
    // ------------------------------------------------------------------------

    fn start_identify(&mut self, blinks: u16, out: &mut Outbox) {
        debug!("Bridge[{}]: Identify, {} blinks", self.config.name, blinks);
        self.identify.start(blinks);
        out.start_timer(TimerId::Identify, self.config.identify_blink());
    }

    fn identify_step(&mut self, out: &mut Outbox) -> BridgeResult<()> {
        match self.identify.step() {
            Some(BlinkStep::Light) => {
                self.correlator.send(OutgoingFrame::bare(Command::LcdTeal), out)?;
                out.start_timer(TimerId::Identify, self.config.identify_blink());
            }
            Some(BlinkStep::Dark) => {
                self.correlator.send(OutgoingFrame::bare(Command::LcdOff), out)?;
                out.start_timer(TimerId::Identify, self.config.identify_blink());
            }
            Some(BlinkStep::Restore) => {
                let command = if self.measurements.backlight_on { Command::LcdRgb } else { Command::LcdOff };
                self.correlator.send(OutgoingFrame::bare(command), out)?;
            }
            None => {}
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reports
    // ------------------------------------------------------------------------

    fn report_power(&self, out: &mut Outbox) {
        self.emit(self.measurements.power_report(), out);
        out.start_timer(TimerId::PowerMax, self.config.report_power_max());
    }

    fn report_temperature(&self, out: &mut Outbox) {
        self.emit(self.measurements.temperature_report(), out);
        out.start_timer(TimerId::TempMax, self.config.report_temp_max());
    }

    fn report_energy(&self, out: &mut Outbox) {
        self.emit(self.measurements.energy_report(), out);
        out.start_timer(TimerId::EnergyMax, self.config.report_energy_max());
    }

    fn emit(&self, report: Report, out: &mut Outbox) {
        trace!("Bridge[{}]: Reporting {:?}", self.config.name, report);
        metrics::counter!(
            metric_defs::REPORTS_EMITTED.name,
            &self.labels.with(&[("report", report.kind().to_string())])
        )
        .increment(1);
        out.report(report);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn measurements(&self) -> &MeasurementSet {
        &self.measurements
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn correlator_state(&self) -> CorrelatorState {
        self.correlator.state()
    }

    pub fn phase(&self) -> PollPhase {
        self.scheduler.phase
    }

    pub fn scheduler(&self) -> &SchedulerState {
        &self.scheduler
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_identifying(&self) -> bool {
        self.identify.is_active()
    }

    /// Timers waiting for the link to go idle.
    pub fn deferred_timers(&self) -> impl Iterator<Item = TimerId> + '_ {
        self.deferred.iter().copied()
    }
}

fn on_off_str(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}
