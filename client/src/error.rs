// SPDX-License-Identifier: GPL-3.0-only

use std::io;

use thiserror::Error;

use hlds_protocol::Error as ProtocolError;

/// The error type for every client operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or stream failure; the cause is chained.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The receive deadline configured on the handle elapsed.
    #[error("Receive timed out")]
    Timeout,
    /// A reply failed to decode; the protocol error carries the detail.
    #[error("Malformed reply: {0}")]
    Format(#[from] ProtocolError),
    /// A reply started with neither the single-packet nor the
    /// split-packet header.
    #[error("Unknown response header {0:02x?}")]
    UnknownHeader([u8; 4]),
    /// The server returned the sentinel challenge, so player and rules
    /// queries cannot proceed.
    #[error("Server refused to issue a query challenge")]
    BadQueryChallenge,
    /// GoldSrc RCON challenge acquisition or refresh failed.
    #[error("RCON challenge was rejected")]
    BadRconChallenge,
    /// RCON authentication failed.
    #[error("RCON password was rejected")]
    BadRconPassword,
    /// The RCON session is not connected.
    #[error("RCON session is not connected")]
    NotConnected,
    /// The RCON session is already connected.
    #[error("RCON session is already connected")]
    AlreadyConnected,
    /// The listener socket is already open.
    #[error("Already listening")]
    AlreadyListening,
    /// The server could not resolve the log address.
    #[error("Server was unable to resolve the address")]
    UnableToResolve,
    /// The log address was already registered on the server.
    #[error("Address is already in the server's log list")]
    AddressAlreadyInList,
    /// The log address is not registered on the server.
    #[error("Address is not in the server's log list")]
    AddressNotFound,
    /// The server's log address list is empty.
    #[error("No log addresses are registered on the server")]
    NoAddressesAdded,
    /// The command went through but the reply matched neither the
    /// success marker nor any recognized failure; carries the reply.
    #[error("Unexpected reply from game server: {0:?}")]
    GameServer(String),
    /// A log line matched the outer frame but none of the event
    /// patterns. Delivered through error callbacks, never returned from
    /// a query.
    #[error("Unrecognized log event: {0:?}")]
    UnknownEvent(String),
    /// Operation on a disposed handle.
    #[error("Server handle is disposed")]
    Disposed,
    /// `set_timeout` was given a value below `-1`.
    #[error("Timeout {0} ms is out of range")]
    TimeoutOutOfRange(i64),
}

impl Error {
    /// Maps a receive failure, folding the platform timeout kinds into
    /// [`Error::Timeout`].
    pub(crate) fn from_recv(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io(e),
        }
    }
}
