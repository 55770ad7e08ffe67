//! Error types for the RAPI protocol.

use thiserror::Error;

use crate::commands::Command;

/// Errors that can occur when encoding or decoding RAPI frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RapiError {
    /// The trailing checksum did not match the XOR of the frame body.
    #[error("checksum mismatch: computed 0x{expected:02X}, frame carries 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum transmitted at the end of the frame.
        actual: u8,
    },

    /// Frame is too short to carry a checksum.
    #[error("frame too short: {len} bytes")]
    FrameTooShort {
        /// Number of bytes captured between the delimiters.
        len: usize,
    },

    /// The byte ahead of the checksum digits is not the `^` mark.
    #[error("checksum mark missing: found 0x{0:02X}")]
    MissingChecksumMark(u8),

    /// A checksum character is not a hexadecimal digit.
    #[error("invalid hex digit: 0x{0:02X}")]
    InvalidHexDigit(u8),

    /// More arguments than a frame can carry.
    #[error("too many arguments: at most 3 allowed, got {0}")]
    TooManyArguments(usize),

    /// A reply is missing a field its command requires.
    #[error("{command:?} reply is missing field `{field}`")]
    MissingField {
        /// Command whose reply was being parsed.
        command: Command,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A reply field could not be parsed as a number.
    #[error("{command:?} reply has invalid `{field}`: {value:?}")]
    InvalidField {
        /// Command whose reply was being parsed.
        command: Command,
        /// Name of the offending field.
        field: &'static str,
        /// Raw token text.
        value: String,
    },

    /// The charger answered with something other than `OK`.
    #[error("negative acknowledgement: {0:?}")]
    NegativeAcknowledgement(String),
}

impl RapiError {
    /// Whether this error should be answered with a resend.
    ///
    /// Every decode failure of a solicited reply is retried; only the
    /// encoder contract violation is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RapiError::TooManyArguments(_))
    }
}

/// Result type alias for RAPI operations.
pub type RapiResult<T> = Result<T, RapiError>;
