#![allow(clippy::uninlined_format_args)]

//! Error related data structures to be shared and used.
//!
//! This module contains the [`Error`] enum, which is used to represent
//! errors that can occur within the core domain.

use std::fmt::{self, Display, Formatter};

/// Top level enum for error handling within the core.
///
/// Most of the time, you will want to use the `CustomError` variant
/// to provide a more detailed error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Cartridge header failed its checksum or referenced an
    /// unrecognized cartridge-type byte.
    InvalidCartridge,
    RomSize,
    /// One of the handful of SM83 opcodes with no defined behavior
    /// was fetched. Carries the opcode and the PC it was fetched from.
    UnknownOpcode(u8, u16),
    InvalidParameter(String),
    CustomError(String),
}

impl Error {
    pub fn description(&self) -> String {
        match self {
            Error::InvalidCartridge => String::from("Invalid cartridge header"),
            Error::RomSize => String::from("Invalid ROM size"),
            Error::UnknownOpcode(opcode, pc) => {
                format!("Unknown opcode 0x{:02x} at 0x{:04x}", opcode, pc)
            }
            Error::InvalidParameter(message) => format!("Invalid parameter: {}", message),
            Error::CustomError(message) => String::from(message),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
