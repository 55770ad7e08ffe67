//! Two-digit ASCII hex conversion used for frame checksums.
//!
//! The least significant nibble travels first, so `0xA5` is written as the
//! two bytes `b"5A"`. Encoder and decoder agree on this order; the charger
//! firmware does the same. Digits are produced in upper case and both cases
//! are accepted on input.

use crate::error::{RapiError, RapiResult};

/// Convert a 4-bit value to its upper-case ASCII hex digit.
pub fn nibble_to_hex(value: u8) -> u8 {
    let value = value & 0x0F;
    if value >= 10 {
        value - 10 + b'A'
    } else {
        value + b'0'
    }
}

/// Convert an ASCII hex digit to its 4-bit value.
pub fn hex_to_nibble(digit: u8) -> RapiResult<u8> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        _ => Err(RapiError::InvalidHexDigit(digit)),
    }
}

/// Encode a byte as two ASCII hex digits, low nibble first.
pub fn u8_to_hex(value: u8) -> [u8; 2] {
    [nibble_to_hex(value), nibble_to_hex(value >> 4)]
}

/// Decode two ASCII hex digits (low nibble first) into a byte.
pub fn hex_to_u8(digits: [u8; 2]) -> RapiResult<u8> {
    let low = hex_to_nibble(digits[0])?;
    let high = hex_to_nibble(digits[1])?;
    Ok((high << 4) | low)
}
