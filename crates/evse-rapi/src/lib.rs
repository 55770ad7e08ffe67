//! OpenEVSE RAPI Serial Protocol
//!
//! This crate provides types and utilities for talking to an OpenEVSE charging
//! station over its serial "RAPI" interface: a line-oriented, half-duplex text
//! protocol where every frame carries an XOR checksum.
//!
//! # Protocol Overview
//!
//! ```text
//! frame    := "$" mnemonic (" " arg)* "^" checksum CR
//! checksum := 2 hex digits, low nibble first = XOR of all prior bytes including "$"
//! ```
//!
//! - **Commands** (host → charger): a 1-5 character mnemonic plus up to three
//!   signed decimal arguments, e.g. `$SH 12345^E2\r`
//! - **Replies** (charger → host): `OK` followed by command-specific fields
//! - **Pushes** (charger → host): unsolicited `ST <hexstate>` or `WF ...` frames
//!
//! # Example
//!
//! ```rust
//! use evse_rapi::{encode, validate_checksum, Command, FrameAccumulator, Reply};
//!
//! let frame = encode(Command::GetEnergy, &[]).unwrap();
//! assert_eq!(frame, b"$GU^63\r");
//!
//! let mut accumulator = FrameAccumulator::new();
//! let captured = accumulator.push(b"$OK 7200 500^01\r");
//! let validated = validate_checksum(&captured[0]).unwrap();
//! let reply = Reply::parse(Command::GetEnergy, &validated).unwrap();
//! # let _ = reply;
//! ```

mod codec;
mod commands;
mod error;
pub mod hex;
mod replies;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use replies::*;
