// SPDX-License-Identifier: GPL-3.0-only

use hlds_protocol::event::Event;

use crate::Error;

/// Receives the typed events parsed from a server's log stream.
///
/// Handlers run on the receiver thread; a handler that blocks stalls
/// every later datagram of its server, so keep the work short or hand
/// it off to a channel.
pub trait EventHandler: Send {
    /// One log line was classified.
    fn event(&mut self, event: Event);

    /// A log line could not be processed. The receiver keeps running.
    fn error(&mut self, error: Error) {
        let _ = error;
    }
}

impl<F> EventHandler for F
where
    F: FnMut(Event) + Send,
{
    fn event(&mut self, event: Event) {
        self(event)
    }
}
