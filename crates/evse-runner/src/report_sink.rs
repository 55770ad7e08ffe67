//! Delivery of reports to the attribute layer.

use std::io::Write;

use chrono::{DateTime, Utc};
use evse_bridge::Report;
use serde::Serialize;

use crate::error::RunnerResult;

/// Receiver of reports produced by the bridge.
pub trait ReportSink {
    fn deliver(&mut self, report: &Report) -> RunnerResult<()>;
}

impl ReportSink for Vec<Report> {
    fn deliver(&mut self, report: &Report) -> RunnerResult<()> {
        self.push(*report);
        Ok(())
    }
}

#[derive(Serialize)]
struct ReportLine<'a> {
    timestamp: DateTime<Utc>,
    charger: &'a str,
    #[serde(flatten)]
    report: &'a Report,
}

/// Writes one JSON object per report, one per line.
///
/// ```text
/// {"timestamp":"2024-05-01T12:00:00Z","charger":"garage","report":"power","volts":2400,"amps":160,"watts":384}
/// ```
pub struct JsonLinesSink<W: Write> {
    writer: W,
    charger: String,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, charger: impl Into<String>) -> Self {
        JsonLinesSink { writer, charger: charger.into() }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn deliver(&mut self, report: &Report) -> RunnerResult<()> {
        let line = ReportLine {
            timestamp: Utc::now(),
            charger: &self.charger,
            report,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
