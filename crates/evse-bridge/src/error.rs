//! Error types for the bridge engine.

use evse_rapi::{Command, RapiError};
use thiserror::Error;

/// Errors surfaced by the bridge engine.
///
/// Link-level failures (bad checksums, NAKs, timeouts) never appear here;
/// the correlator absorbs them through its retry policy.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A command was issued while another one is still awaiting its reply.
    #[error("cannot send {requested:?} while {pending:?} is awaiting a reply")]
    CommandPending {
        /// Command currently in flight.
        pending: Command,
        /// Command that was refused.
        requested: Command,
    },

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Protocol encoding error.
    #[error("protocol error: {0}")]
    Protocol(#[from] RapiError),
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
