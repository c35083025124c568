// SPDX-License-Identifier: GPL-3.0-only

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread;

use ahash::AHashMap;
use log::{debug, trace};

use crate::server::{Server, REARM_INTERVAL};
use crate::transport::MAX_DATAGRAM;
use crate::Error;

type ErrorCallback = Box<dyn FnMut(SocketAddr, Error) + Send>;

#[derive(Default)]
struct ListenState {
    sock: Option<UdpSocket>,
    alive: Option<Arc<AtomicBool>>,
}

struct Shared {
    /// Source endpoint to server. Weak so the table never keeps a
    /// dropped handle alive and no cycle can form through back
    /// pointers.
    servers: RwLock<AHashMap<SocketAddr, Weak<Server>>>,
    state: RwLock<ListenState>,
    errors: Mutex<Option<ErrorCallback>>,
}

impl Shared {
    fn report(&self, from: SocketAddr, error: Error) {
        let mut guard = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(callback) => callback(from, error),
            None => debug!("{from}: log error dropped: {error}"),
        }
    }
}

/// A UDP log receiver shared by any number of servers.
///
/// Every incoming datagram is routed to exactly one server: the one
/// whose remote endpoint equals the datagram's source endpoint. Unknown
/// sources are dropped. Failures inside
/// [`Server::process_log`] go to the error callback; the receive loop
/// itself never dies from them.
pub struct LogListener {
    shared: Arc<Shared>,
}

impl Default for LogListener {
    fn default() -> Self {
        Self::new()
    }
}

impl LogListener {
    /// Creates an idle listener.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                servers: RwLock::new(AHashMap::new()),
                state: RwLock::new(ListenState::default()),
                errors: Mutex::new(None),
            }),
        }
    }

    /// Routes datagrams from `server`'s endpoint to it.
    pub fn add_server(&self, server: &Arc<Server>) -> Result<(), Error> {
        server.ensure_live()?;
        self.shared
            .servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(server.addr(), Arc::downgrade(server));
        Ok(())
    }

    /// Stops routing to `server`. Rejects disposed handles.
    pub fn remove_server(&self, server: &Arc<Server>) -> Result<(), Error> {
        server.ensure_live()?;
        self.remove_endpoint(server.addr());
        Ok(())
    }

    /// Stops routing datagrams arriving from `endpoint`; returns
    /// whether a mapping existed.
    pub fn remove_endpoint(&self, endpoint: SocketAddr) -> bool {
        self.shared
            .servers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&endpoint)
            .is_some()
    }

    /// Installs the callback receiving per-datagram processing errors.
    pub fn set_error_handler<F>(&self, callback: F)
    where
        F: FnMut(SocketAddr, Error) + Send + 'static,
    {
        *self
            .shared
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(callback));
    }

    /// Opens the ingest socket on `local` and starts the receive loop.
    pub fn listen(&self, local: SocketAddr) -> Result<(), Error> {
        let mut state = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if state.sock.is_some() {
            return Err(Error::AlreadyListening);
        }

        let sock = UdpSocket::bind(local)?;
        sock.set_read_timeout(Some(REARM_INTERVAL))?;
        let reader = sock.try_clone()?;
        let alive = Arc::new(AtomicBool::new(true));
        state.sock = Some(sock);
        state.alive = Some(alive.clone());
        drop(state);

        let shared = Arc::clone(&self.shared);
        thread::spawn(move || run(shared, reader, alive));
        Ok(())
    }

    /// Local endpoint of the ingest socket while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sock
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    /// Closes the ingest socket; the receive loop exits on its next
    /// wakeup. Idempotent.
    pub fn stop(&self) {
        let mut state = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(alive) = state.alive.take() {
            alive.store(false, Ordering::SeqCst);
        }
        state.sock = None;
    }
}

impl Drop for LogListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<Shared>, sock: UdpSocket, alive: Arc<AtomicBool>) {
    let mut buf = [0; MAX_DATAGRAM];
    while alive.load(Ordering::SeqCst) {
        let (n, from) = match sock.recv_from(&mut buf) {
            Ok(x) => x,
            Err(e) => match Error::from_recv(e) {
                Error::Timeout => continue,
                _ => break,
            },
        };

        // shared lock only for the lookup; a fresh one is taken for
        // every datagram so listen/stop are never starved
        let target = shared
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&from)
            .cloned();
        let Some(server) = target.and_then(|weak| weak.upgrade()) else {
            trace!("{from}: dropped datagram from unknown endpoint");
            continue;
        };
        if server.is_disposed() {
            continue;
        }
        if let Err(e) = server.process_log(&buf[..n]) {
            shared.report(from, e);
        }
    }
    trace!("log listener stopped");
}
