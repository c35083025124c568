// SPDX-License-Identifier: LGPL-3.0-only

#![deny(missing_docs)]

//! Wire protocols spoken by GoldSrc and Source game servers.
//!
//! This crate is the pure codec layer: it encodes A2S query requests,
//! decodes their replies, frames Source RCON packets, and parses the two
//! textual protocols (the RCON `status` reply and the HL log standard).
//! It never touches a socket; the `hlds-client` crate owns transport and
//! session state.

/// Compiles a regular expression once and returns a `'static` reference.
///
/// Patterns are literals, so a failed compilation is a bug in this crate.
macro_rules! regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).unwrap())
    }};
}

mod cursor;

pub mod a2s;
pub mod event;
pub mod info;
pub mod player;
pub mod rcon;
pub mod status;
pub mod types;

pub use cursor::CursorError;

use thiserror::Error;

/// The error type for decoding packets and parsing server text.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A buffer did not have the expected shape.
    #[error("Invalid packet")]
    InvalidPacket,
    /// A length-prefixed RCON packet announced an illegal size.
    #[error("Packet size {0} is out of range")]
    InvalidPacketSize(i32),
    /// Ran out of buffer while decoding a field.
    #[error("{0}")]
    Cursor(#[from] CursorError),
    /// A textual reply did not match the expected grammar; carries the
    /// offending input.
    #[error("Reply does not match the expected format: {0:?}")]
    InvalidFormat(String),
    /// A log line matched the outer frame but none of the event patterns.
    #[error("Unrecognized log event: {0:?}")]
    UnknownEvent(String),
}
