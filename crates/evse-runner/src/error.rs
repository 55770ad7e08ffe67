//! Error types for the runner.

use evse_bridge::BridgeError;
use thiserror::Error;

/// Errors that stop the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// I/O error on a file, socket or stdout.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Configuration file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Settings file or report could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Ctrl-C handler could not be installed.
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// Configuration is incomplete or contradictory.
    #[error("configuration error: {0}")]
    Config(String),

    /// The link to the charger went away.
    #[error("link closed: {0}")]
    LinkClosed(String),
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
