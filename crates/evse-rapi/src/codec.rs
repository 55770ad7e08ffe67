//! Frame codec for the RAPI serial link.
//!
//! Every message on the wire, in either direction, looks like:
//!
//! ```text
//! $<body>^<checksum>\r
//! ```
//!
//! where `<checksum>` is two hex digits, low nibble first, holding the XOR of
//! every byte before the `^` including the leading `$`.

use bytes::BytesMut;
use log::trace;

use crate::commands::{Command, CommandArgs, OutgoingFrame};
use crate::error::{RapiError, RapiResult};
use crate::hex;

/// Start-of-frame delimiter.
pub const FRAME_START: u8 = b'$';

/// End-of-frame delimiter.
pub const FRAME_END: u8 = b'\r';

/// Separates the frame body from its checksum.
pub const CHECKSUM_MARK: u8 = b'^';

/// Maximum number of bytes captured between `$` and `\r`.
pub const MAX_FRAME_PAYLOAD: usize = 33;

/// Single byte sent ahead of a resend to flush whatever the charger has buffered.
pub const RECOVERY_BYTE: u8 = b'\r';

/// XOR of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Encode a frame for transmission.
pub fn encode_frame(frame: &OutgoingFrame) -> Vec<u8> {
    let body = frame.body();
    let mut buf = Vec::with_capacity(body.len() + 5);
    buf.push(FRAME_START);
    buf.extend_from_slice(body.as_bytes());
    let chk = checksum(&buf);
    buf.push(CHECKSUM_MARK);
    buf.extend_from_slice(&hex::u8_to_hex(chk));
    buf.push(FRAME_END);
    buf
}

/// Encode a command with up to three arguments.
pub fn encode(command: Command, args: &[i32]) -> RapiResult<Vec<u8>> {
    let args = CommandArgs::from_slice(args)?;
    Ok(encode_frame(&OutgoingFrame::with_args(command, args)))
}

/// A frame whose checksum has been verified.
///
/// Holds the body text, i.e. everything between `$` and `^`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFrame {
    text: String,
}

impl ValidatedFrame {
    /// The frame body.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the body starts with the given mnemonic.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.text.starts_with(prefix)
    }

    /// Whether the charger acknowledged the last command.
    pub fn is_ack(&self) -> bool {
        self.starts_with("OK")
    }

    /// Whitespace-separated fields following the two-character echo.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.text.get(2..).unwrap_or("").split_whitespace()
    }
}

/// Verify the checksum of a candidate frame captured by [`FrameAccumulator`].
///
/// The last two bytes are the checksum digits and the byte before them is the
/// `^` mark. The XOR of `$` and every byte ahead of the mark must equal the
/// value the digits encode.
pub fn validate_checksum(candidate: &[u8]) -> RapiResult<ValidatedFrame> {
    if candidate.len() < 4 {
        return Err(RapiError::FrameTooShort { len: candidate.len() });
    }
    let body_len = candidate.len() - 3;
    if candidate[body_len] != CHECKSUM_MARK {
        return Err(RapiError::MissingChecksumMark(candidate[body_len]));
    }
    let body = &candidate[..body_len];
    let expected = FRAME_START ^ checksum(body);
    let digits = [candidate[candidate.len() - 2], candidate[candidate.len() - 1]];
    let actual = hex::hex_to_u8(digits)?;
    if expected != actual {
        return Err(RapiError::ChecksumMismatch { expected, actual });
    }
    Ok(ValidatedFrame {
        text: String::from_utf8_lossy(body).into_owned(),
    })
}

/// Byte-at-a-time frame accumulator.
///
/// Bytes before the first `$` are discarded, since the charger may be halfway
/// through a frame when the link comes up. A `$` always restarts capture.
/// Bytes beyond [`MAX_FRAME_PAYLOAD`] are dropped without ending the frame.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: BytesMut,
    capturing: bool,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAccumulator {
    /// Create a new, idle accumulator.
    pub fn new() -> Self {
        FrameAccumulator {
            buffer: BytesMut::with_capacity(MAX_FRAME_PAYLOAD + 1),
            capturing: false,
        }
    }

    /// Feed one byte. Returns the captured bytes when a frame ends.
    pub fn feed(&mut self, byte: u8) -> Option<Vec<u8>> {
        match byte {
            FRAME_START => {
                if !self.buffer.is_empty() {
                    trace!("discarding {} byte partial frame", self.buffer.len());
                }
                self.buffer.clear();
                self.capturing = true;
                None
            }
            FRAME_END => {
                if !self.capturing {
                    return None;
                }
                self.capturing = false;
                let frame = self.buffer.split().to_vec();
                trace!("captured frame {:?}", String::from_utf8_lossy(&frame));
                Some(frame)
            }
            _ => {
                if self.capturing && self.buffer.len() < MAX_FRAME_PAYLOAD {
                    self.buffer.extend_from_slice(&[byte]);
                }
                None
            }
        }
    }

    /// Feed a chunk of bytes, collecting every frame that completes.
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        data.iter().filter_map(|&byte| self.feed(byte)).collect()
    }

    /// Whether a frame is currently being captured.
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.capturing = false;
    }
}
