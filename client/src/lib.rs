// SPDX-License-Identifier: GPL-3.0-only

//! Client library for GoldSrc and Source game servers.
//!
//! Three wire protocols are covered: the A2S query family over UDP, the
//! two incompatible RCON flavors (GoldSrc challenge-then-datagram over
//! UDP, Source length-prefixed TCP sessions), and the one-way log
//! push, where servers send HL-standard log lines over UDP to a local
//! listener that turns them into typed [`Event`](protocol::event::Event)
//! values.
//!
//! Everything blocks the calling thread; there is no async runtime.
//! Handles are cheap to clone and safe to share across threads.

/// Compiles a regular expression once and returns a `'static` reference.
macro_rules! regex {
    ($pattern:expr) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($pattern).unwrap())
    }};
}

mod error;
mod goldsrc;
mod handler;
mod listener;
mod server;
mod source;
mod transport;

pub use hlds_protocol as protocol;

pub use crate::error::Error;
pub use crate::goldsrc::GoldSrcServer;
pub use crate::handler::EventHandler;
pub use crate::listener::LogListener;
pub use crate::server::{Engine, Server, DEFAULT_TIMEOUT_MS};
pub use crate::source::SourceServer;
