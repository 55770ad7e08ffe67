//! Metrics infrastructure for the OpenEVSE serial bridge.
//!
//! This crate declares every metric the bridge emits as a structured
//! [`Metric`] constant and re-exports the `metrics` crate for convenience.
//! Without an installed recorder the `metrics` macros are no-ops, so the
//! bridge can emit unconditionally.
//!
//! # Example
//!
//! ```rust,ignore
//! use evse_metrics::{MetricLabels, metric_defs, describe_metrics};
//!
//! describe_metrics();
//!
//! let labels = MetricLabels::new("garage");
//! metrics::counter!(metric_defs::LINK_FRAMES_SENT.name, &labels.to_labels()).increment(1);
//! ```
//!
//! # Declaring a metric
//!
//! ```rust
//! use evse_metrics::{Metric, MetricKind};
//! use metrics::Unit;
//!
//! const MY_COUNTER: Metric = Metric::counter("my.counter")
//!     .with_description("A counter metric")
//!     .with_unit(Unit::Count);
//!
//! assert_eq!(MY_COUNTER.kind, MetricKind::Counter);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_histogram, Unit};

/// Whether a metric counts events or records a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
}

/// A metric name together with what `describe_*` needs to know about it.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Unit,
    /// Label keys the bridge attaches when emitting.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter, Unit::Count)
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram, Unit::Milliseconds)
    }

    const fn new(name: &'static str, kind: MetricKind, unit: Unit) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit,
            labels: metric_defs::STANDARD_LABELS,
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with whatever recorder is installed.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

/// All metric definitions for the bridge.
pub mod metric_defs {
    use super::Metric;

    /// Labels present on every bridge metric.
    pub const STANDARD_LABELS: &[&str] = &["charger"];

    // ========================================================================
    // Link Layer
    // ========================================================================

    /// Frames written to the charger, including resends.
    ///
    /// Labels: charger, command
    pub const LINK_FRAMES_SENT: Metric = Metric::counter("evse.link.frames_sent")
        .with_description("Frames written to the charger, including resends")
        .with_labels(&["charger", "command"]);

    /// Frames captured from the charger, before checksum validation.
    pub const LINK_FRAMES_RECEIVED: Metric = Metric::counter("evse.link.frames_received")
        .with_description("Frames captured from the charger");

    /// Frames rejected because their checksum did not match.
    pub const LINK_CHECKSUM_FAILURES: Metric = Metric::counter("evse.link.checksum_failures")
        .with_description("Frames rejected because of a bad checksum");

    // ========================================================================
    // Command/Response
    // ========================================================================

    /// Replies that were neither `OK` nor a recognised push.
    pub const COMMAND_NAKS: Metric = Metric::counter("evse.command.naks")
        .with_description("Negative acknowledgements received")
        .with_labels(&["charger", "command"]);

    /// `OK` replies missing fields the pending command needs.
    pub const COMMAND_MALFORMED: Metric = Metric::counter("evse.command.malformed")
        .with_description("Acknowledged replies that could not be parsed")
        .with_labels(&["charger", "command"]);

    /// Commands that saw no valid reply before the timeout.
    pub const COMMAND_TIMEOUTS: Metric = Metric::counter("evse.command.timeouts")
        .with_description("Commands that timed out waiting for a reply")
        .with_labels(&["charger", "command"]);

    /// Resends issued by the retry policy.
    pub const COMMAND_RESENDS: Metric = Metric::counter("evse.command.resends")
        .with_description("Commands resent after a failed exchange")
        .with_labels(&["charger", "command"]);

    /// Commands given up on after exhausting their resends.
    pub const COMMAND_ABANDONED: Metric = Metric::counter("evse.command.abandoned")
        .with_description("Commands dropped after exhausting resends")
        .with_labels(&["charger", "command"]);

    /// Time from first transmission to accepted reply.
    pub const COMMAND_LATENCY: Metric = Metric::histogram("evse.command.latency_ms")
        .with_description("Time from first transmission to accepted reply")
        .with_labels(&["charger", "command"]);

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Reports handed to the attribute layer.
    ///
    /// Labels: charger, report (power, temperature, energy, state)
    pub const REPORTS_EMITTED: Metric = Metric::counter("evse.reports.emitted")
        .with_description("Attribute reports emitted")
        .with_labels(&["charger", "report"]);

    /// Unsolicited state pushes received.
    pub const STATE_PUSHES: Metric = Metric::counter("evse.reports.state_pushes")
        .with_description("Unsolicited state changes pushed by the charger");

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &LINK_FRAMES_SENT,
        &LINK_FRAMES_RECEIVED,
        &LINK_CHECKSUM_FAILURES,
        &COMMAND_NAKS,
        &COMMAND_MALFORMED,
        &COMMAND_TIMEOUTS,
        &COMMAND_RESENDS,
        &COMMAND_ABANDONED,
        &COMMAND_LATENCY,
        &REPORTS_EMITTED,
        &STATE_PUSHES,
    ];
}

/// Metric labels identifying the charger a bridge talks to.
///
/// # Example
///
/// ```rust
/// use evse_metrics::MetricLabels;
///
/// let labels = MetricLabels::new("garage");
/// let extended = labels.with(&[("command", "GG".to_string())]);
/// assert_eq!(extended.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MetricLabels {
    /// Charger name from the configuration.
    pub charger: String,
}

impl MetricLabels {
    /// Creates labels for the named charger.
    pub fn new(charger: impl Into<String>) -> Self {
        Self { charger: charger.into() }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("charger", self.charger.clone())]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all metrics used by the bridge.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Install a Prometheus recorder serving scrapes on `addr`.
#[cfg(feature = "prometheus")]
pub fn install_prometheus_exporter(
    addr: std::net::SocketAddr,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
}
