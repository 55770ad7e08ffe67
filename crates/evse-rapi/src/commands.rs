//! Commands that can be sent to the charger.
//!
//! Each command has a fixed wire mnemonic. Some mnemonics carry their own
//! argument (`FB 0` turns the display off), so a mnemonic may contain a space.

use crate::error::{RapiError, RapiResult};

/// Maximum number of integer arguments a frame can carry.
pub const MAX_ARGS: usize = 3;

/// Mnemonic table indexed by command ordinal. Index 0 is the idle slot and
/// has no mnemonic.
pub const MNEMONICS: [&str; 15] = [
    "", "ST", "WF", "FS", "FE", "FB 0", "S0 1", "FB 6", "GG", "GP", "GU", "GS", "GE", "SH", "SC",
];

/// Commands understood by the charger (and the two it pushes unsolicited).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Command {
    /// Asynchronous state change notice (`ST`), pushed by the charger.
    State = 1,
    /// Asynchronous link reset request (`WF`), pushed by the charger.
    Wifi = 2,
    /// Put the charger to sleep (`FS`).
    Sleep = 3,
    /// Enable the charger (`FE`).
    Enable = 4,
    /// Turn the display backlight off (`FB 0`).
    LcdOff = 5,
    /// Switch the display to full colour (`S0 1`).
    LcdRgb = 6,
    /// Set the display backlight to teal (`FB 6`).
    LcdTeal = 7,
    /// Read charging current and voltage (`GG`).
    GetPower = 8,
    /// Read temperature sensors (`GP`).
    GetTemp = 9,
    /// Read session and accumulated energy (`GU`).
    GetEnergy = 10,
    /// Read the charger state (`GS`).
    GetState = 11,
    /// Read current capacity and settings flags (`GE`).
    GetSettings = 12,
    /// Set the session energy limit (`SH`).
    SetLimit = 13,
    /// Set the charging current (`SC`).
    SetCurrent = 14,
}

impl Command {
    /// All commands in ordinal order.
    pub const ALL: [Command; 14] = [
        Command::State,
        Command::Wifi,
        Command::Sleep,
        Command::Enable,
        Command::LcdOff,
        Command::LcdRgb,
        Command::LcdTeal,
        Command::GetPower,
        Command::GetTemp,
        Command::GetEnergy,
        Command::GetState,
        Command::GetSettings,
        Command::SetLimit,
        Command::SetCurrent,
    ];

    /// The ordinal used to index [`MNEMONICS`].
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Look a command up by ordinal. Ordinal 0 is the idle slot and maps to `None`.
    pub fn from_ordinal(ordinal: u8) -> Option<Command> {
        Command::ALL.get(usize::from(ordinal).checked_sub(1)?).copied()
    }

    /// The wire mnemonic for this command.
    pub fn mnemonic(self) -> &'static str {
        MNEMONICS[usize::from(self.ordinal())]
    }

    /// Whether the charger sends this command on its own initiative.
    pub fn is_push(self) -> bool {
        matches!(self, Command::State | Command::Wifi)
    }
}

/// Up to [`MAX_ARGS`] signed integer arguments for an outgoing frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandArgs {
    values: [i32; MAX_ARGS],
    len: u8,
}

impl CommandArgs {
    /// No arguments.
    pub const fn none() -> Self {
        CommandArgs { values: [0; MAX_ARGS], len: 0 }
    }

    /// A single argument.
    pub const fn one(value: i32) -> Self {
        CommandArgs { values: [value, 0, 0], len: 1 }
    }

    /// Build from a slice, rejecting more than [`MAX_ARGS`] values.
    pub fn from_slice(values: &[i32]) -> RapiResult<Self> {
        if values.len() > MAX_ARGS {
            return Err(RapiError::TooManyArguments(values.len()));
        }
        let mut args = CommandArgs::none();
        args.values[..values.len()].copy_from_slice(values);
        args.len = values.len() as u8;
        Ok(args)
    }

    /// The arguments as a slice.
    pub fn as_slice(&self) -> &[i32] {
        &self.values[..usize::from(self.len)]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A command plus its arguments, ready to be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub command: Command,
    pub args: CommandArgs,
}

impl OutgoingFrame {
    /// A frame with no arguments.
    pub fn bare(command: Command) -> Self {
        OutgoingFrame { command, args: CommandArgs::none() }
    }

    /// A frame with the given arguments.
    pub fn with_args(command: Command, args: CommandArgs) -> Self {
        OutgoingFrame { command, args }
    }

    /// The frame text between `$` and `^`, e.g. `SH 12345`.
    pub fn body(&self) -> String {
        let mut body = String::from(self.command.mnemonic());
        for arg in self.args.as_slice() {
            body.push(' ');
            body.push_str(&arg.to_string());
        }
        body
    }
}
