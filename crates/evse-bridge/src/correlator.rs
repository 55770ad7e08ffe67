//! Command/response correlation.
//!
//! The link is half duplex and the charger answers one command at a time, so
//! at most one command is ever outstanding. Every failed exchange (bad
//! checksum, negative acknowledgement, unparsable reply, timeout) goes through
//! the same retry policy: flush the charger's line buffer with a lone `\r`,
//! then resend the bare mnemonic. Arguments are not carried over to a resend,
//! so a resent `SH 12345` degrades to `SH`.

use std::time::{Duration, Instant};

use evse_metrics::{metric_defs, MetricLabels};
use evse_rapi::{
    classify, encode_frame, parse_state_push, validate_checksum, Command, FrameKind, OutgoingFrame,
    RapiError, Reply, RECOVERY_BYTE,
};
use tracing::{debug, trace, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::event::{Outbox, TimerId};

/// Where the correlator is in an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelatorState {
    Idle,
    AwaitingReply { command: Command, resend_count: u8 },
}

/// Result of applying the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The pending command was sent again; `attempt` counts resends so far.
    Resent { attempt: u8 },
    /// Resends exhausted, command dropped.
    Abandoned(Command),
    /// Nothing was pending.
    NothingPending,
}

/// What a captured frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Reply to the pending command, parsed. The correlator is idle again.
    Completed { command: Command, reply: Reply },
    /// Unsolicited state change.
    StatePush(u16),
    /// The charger asked for a link reset.
    LinkReset,
    /// The exchange failed and the retry policy ran.
    Failed { error: RapiError, retry: RetryOutcome },
    /// A well-formed frame that nobody was waiting for.
    Ignored,
}

impl FrameOutcome {
    /// Whether this outcome returned the correlator to idle.
    pub fn freed_link(&self) -> bool {
        matches!(
            self,
            FrameOutcome::Completed { .. }
                | FrameOutcome::Failed { retry: RetryOutcome::Abandoned(_), .. }
        )
    }
}

#[derive(Debug)]
pub struct Correlator {
    name: String,
    labels: MetricLabels,
    state: CorrelatorState,
    timeout: Duration,
    max_resends: u8,
    sent_at: Option<Instant>,
}

impl Correlator {
    pub fn new(name: impl Into<String>, timeout: Duration, max_resends: u8) -> Self {
        let name = name.into();
        Correlator {
            labels: MetricLabels::new(name.clone()),
            name,
            state: CorrelatorState::Idle,
            timeout,
            max_resends,
            sent_at: None,
        }
    }

    pub fn state(&self) -> CorrelatorState {
        self.state
    }

    /// The command awaiting a reply, if any.
    pub fn pending(&self) -> Option<Command> {
        match self.state {
            CorrelatorState::Idle => None,
            CorrelatorState::AwaitingReply { command, .. } => Some(command),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == CorrelatorState::Idle
    }

    /// Transmit a command and start waiting for its reply.
    pub fn send(&mut self, frame: OutgoingFrame, out: &mut Outbox) -> BridgeResult<()> {
        if let Some(pending) = self.pending() {
            return Err(BridgeError::CommandPending {
                pending,
                requested: frame.command,
            });
        }
        debug!("Bridge[{}]: Sending {}", self.name, frame.body());
        self.transmit(&frame, out);
        self.state = CorrelatorState::AwaitingReply {
            command: frame.command,
            resend_count: 0,
        };
        self.sent_at = Some(Instant::now());
        Ok(())
    }

    /// Handle a frame captured by the accumulator.
    pub fn on_frame(&mut self, candidate: &[u8], out: &mut Outbox) -> FrameOutcome {
        metrics::counter!(metric_defs::LINK_FRAMES_RECEIVED.name, &self.labels.to_labels()).increment(1);

        let frame = match validate_checksum(candidate) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(
                    "Bridge[{}]: Dropping frame {:?}: {}",
                    self.name,
                    String::from_utf8_lossy(candidate),
                    error
                );
                metrics::counter!(metric_defs::LINK_CHECKSUM_FAILURES.name, &self.labels.to_labels())
                    .increment(1);
                let retry = self.retry(out);
                return FrameOutcome::Failed { error, retry };
            }
        };
        trace!("Bridge[{}]: Received {:?}", self.name, frame.text());

        match classify(&frame) {
            FrameKind::StatePush => match parse_state_push(&frame) {
                Ok(state) => FrameOutcome::StatePush(state),
                Err(error) => {
                    warn!("Bridge[{}]: Unreadable state push: {}", self.name, error);
                    FrameOutcome::Ignored
                }
            },
            FrameKind::LinkReset => FrameOutcome::LinkReset,
            FrameKind::Nak => {
                let Some(command) = self.pending() else {
                    trace!("Bridge[{}]: Stray frame {:?} while idle", self.name, frame.text());
                    return FrameOutcome::Ignored;
                };
                warn!("Bridge[{}]: {:?} answered with {:?}", self.name, command, frame.text());
                metrics::counter!(metric_defs::COMMAND_NAKS.name, &self.command_labels(command)).increment(1);
                let error = RapiError::NegativeAcknowledgement(frame.text().to_string());
                let retry = self.retry(out);
                FrameOutcome::Failed { error, retry }
            }
            FrameKind::Ack => {
                let Some(command) = self.pending() else {
                    trace!("Bridge[{}]: Stray acknowledgement {:?} while idle", self.name, frame.text());
                    return FrameOutcome::Ignored;
                };
                match Reply::parse(command, &frame) {
                    Ok(reply) => {
                        self.complete(command, out);
                        FrameOutcome::Completed { command, reply }
                    }
                    Err(error) => {
                        warn!("Bridge[{}]: Malformed reply to {:?}: {}", self.name, command, error);
                        metrics::counter!(metric_defs::COMMAND_MALFORMED.name, &self.command_labels(command))
                            .increment(1);
                        let retry = self.retry(out);
                        FrameOutcome::Failed { error, retry }
                    }
                }
            }
        }
    }

    /// Handle expiry of the command timeout.
    pub fn on_timeout(&mut self, out: &mut Outbox) -> RetryOutcome {
        let Some(command) = self.pending() else {
            return RetryOutcome::NothingPending;
        };
        warn!("Bridge[{}]: Timed out waiting for {:?}", self.name, command);
        metrics::counter!(metric_defs::COMMAND_TIMEOUTS.name, &self.command_labels(command)).increment(1);
        self.retry(out)
    }

    /// Resend the pending command, or abandon it once resends run out.
    ///
    /// A resend is a lone `\r` followed by the bare mnemonic. Arguments are
    /// not carried over, so a failed `SH 12345` is retried as a plain `SH`.
    pub fn retry(&mut self, out: &mut Outbox) -> RetryOutcome {
        let CorrelatorState::AwaitingReply { command, resend_count } = self.state else {
            return RetryOutcome::NothingPending;
        };
        let attempt = resend_count.saturating_add(1);
        if attempt > self.max_resends {
            warn!(
                "Bridge[{}]: Giving up on {:?} after {} resends",
                self.name, command, self.max_resends
            );
            metrics::counter!(metric_defs::COMMAND_ABANDONED.name, &self.command_labels(command)).increment(1);
            self.state = CorrelatorState::Idle;
            self.sent_at = None;
            out.stop_timer(TimerId::CommandTimeout);
            return RetryOutcome::Abandoned(command);
        }

        debug!("Bridge[{}]: Resending {:?} (attempt {})", self.name, command, attempt);
        metrics::counter!(metric_defs::COMMAND_RESENDS.name, &self.command_labels(command)).increment(1);
        out.transmit(vec![RECOVERY_BYTE]);
        self.transmit(&OutgoingFrame::bare(command), out);
        self.state = CorrelatorState::AwaitingReply {
            command,
            resend_count: attempt,
        };
        RetryOutcome::Resent { attempt }
    }

    fn transmit(&self, frame: &OutgoingFrame, out: &mut Outbox) {
        metrics::counter!(metric_defs::LINK_FRAMES_SENT.name, &self.command_labels(frame.command)).increment(1);
        out.transmit(encode_frame(frame));
        out.start_timer(TimerId::CommandTimeout, self.timeout);
    }

    fn complete(&mut self, command: Command, out: &mut Outbox) {
        if let Some(sent_at) = self.sent_at.take() {
            let elapsed = sent_at.elapsed().as_secs_f64() * 1000.0;
            metrics::histogram!(metric_defs::COMMAND_LATENCY.name, &self.command_labels(command)).record(elapsed);
        }
        debug!("Bridge[{}]: {:?} completed", self.name, command);
        self.state = CorrelatorState::Idle;
        out.stop_timer(TimerId::CommandTimeout);
    }

    fn command_labels(&self, command: Command) -> Vec<(&'static str, String)> {
        self.labels.with(&[("command", command.mnemonic().to_string())])
    }
}
