//! Driver for the OpenEVSE bridge.
//!
//! Connects an [`evse_bridge::Session`] to a real serial link (or a networked
//! serial server), a wall clock, a settings file and a report sink, and runs
//! it on a single event loop thread.

pub mod cli;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod host;
pub mod link;
pub mod report_sink;
pub mod settings_store;

pub use cli::Cli;
pub use config::{LinkConfig, RunnerConfig};
pub use error::{RunnerError, RunnerResult};
pub use event_loop::{EventLoop, Input, TimerTable};
pub use report_sink::{JsonLinesSink, ReportSink};
pub use settings_store::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
