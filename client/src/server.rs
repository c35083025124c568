// SPDX-License-Identifier: GPL-3.0-only

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use hlds_protocol::a2s;
use hlds_protocol::event;
use hlds_protocol::info::ServerInfo;
use hlds_protocol::types;
use hlds_protocol::Error as ProtocolError;

use crate::handler::EventHandler;
use crate::transport::{self, SplitDialect, MAX_DATAGRAM};
use crate::Error;

/// Default receive timeout for every blocking operation.
pub const DEFAULT_TIMEOUT_MS: i64 = 5000;

/// How often background receivers wake up to notice they were stopped.
pub(crate) const REARM_INTERVAL: Duration = Duration::from_millis(250);

/// Which engine family a server runs. Decides the split-packet dialect,
/// the RCON flavor and the `status` table layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    /// Half-Life 1 era engine.
    GoldSrc,
    /// Source engine (OrangeBox split packets).
    Source,
}

struct LogReader {
    sock: Option<UdpSocket>,
    running: Arc<AtomicBool>,
}

/// Engine-agnostic core of a server handle: the remote endpoint, the
/// query operations and the log ingest path.
///
/// Callers normally hold a [`GoldSrcServer`](crate::GoldSrcServer) or
/// [`SourceServer`](crate::SourceServer), which wrap an `Arc<Server>`
/// and add the engine's RCON flavor on top.
pub struct Server {
    addr: SocketAddr,
    engine: Engine,
    password: RwLock<String>,
    timeout_ms: AtomicI64,
    disposed: AtomicBool,
    handler: Mutex<Option<Box<dyn EventHandler>>>,
    log_reader: Mutex<LogReader>,
}

impl Server {
    /// Creates a live handle bound to `addr`.
    pub fn new(engine: Engine, addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            addr,
            engine,
            password: RwLock::new(String::new()),
            timeout_ms: AtomicI64::new(DEFAULT_TIMEOUT_MS),
            disposed: AtomicBool::new(false),
            handler: Mutex::new(None),
            log_reader: Mutex::new(LogReader {
                sock: None,
                running: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    /// Remote endpoint this handle talks to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Engine family given at construction.
    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Current RCON password.
    pub fn password(&self) -> String {
        self.password
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the RCON password. Advisory: affects subsequent
    /// operations only.
    pub fn set_password(&self, password: &str) {
        *self
            .password
            .write()
            .unwrap_or_else(PoisonError::into_inner) = password.to_owned();
    }

    /// Configured receive timeout in milliseconds.
    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    /// Sets the receive timeout in milliseconds. `0` and `-1` both mean
    /// no timeout; values below `-1` are rejected.
    pub fn set_timeout(&self, ms: i64) -> Result<(), Error> {
        if ms < -1 {
            return Err(Error::TimeoutOutOfRange(ms));
        }
        self.timeout_ms.store(ms, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms() {
            ms if ms <= 0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    /// True once [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), Error> {
        if self.is_disposed() {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn dialect(&self) -> SplitDialect {
        match self.engine {
            Engine::GoldSrc => SplitDialect::GoldSrc,
            Engine::Source => SplitDialect::OrangeBox,
        }
    }

    /// Sends `request` and returns the complete reply, reassembled if
    /// the server split it.
    pub(crate) fn query(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        self.ensure_live()?;
        transport::query(self.addr, request, self.timeout(), self.dialect())
    }

    /// Sends `request` without waiting for any reply.
    pub(crate) fn send(&self, request: &[u8]) -> Result<(), Error> {
        self.ensure_live()?;
        transport::send(self.addr, request)
    }

    /// A2S ping. A receive timeout yields `Ok(false)`; other socket
    /// failures propagate.
    pub fn ping(&self) -> Result<bool, Error> {
        match self.query(a2s::Ping::REQUEST) {
            Ok(reply) => Ok(a2s::Ping::is_response(&reply)),
            Err(Error::Timeout) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetches and parses A2S_INFO.
    pub fn get_info(&self) -> Result<ServerInfo, Error> {
        let reply = self.query(a2s::GetInfo::REQUEST)?;
        Ok(ServerInfo::decode(&reply)?)
    }

    /// Runs the challenge handshake and returns the nonce for player
    /// and rules queries.
    fn get_challenge(&self) -> Result<i32, Error> {
        let reply = self.query(a2s::GetChallenge::REQUEST)?;
        let resp = a2s::ChallengeResponse::decode(&reply)?;
        if resp.challenge == a2s::CHALLENGE_EMPTY {
            return Err(Error::BadQueryChallenge);
        }
        Ok(resp.challenge)
    }

    /// Fetches the player list. Two round trips: challenge, then query.
    pub fn get_players(&self) -> Result<Vec<a2s::PlayerInfo>, Error> {
        let challenge = self.get_challenge()?;
        let mut buf = [0; 16];
        let n = a2s::GetPlayers { challenge }.encode(&mut buf)?;
        let reply = self.query(&buf[..n])?;
        Ok(a2s::PlayersResponse::decode(&reply)?.players)
    }

    /// Fetches the server rules. Two round trips: challenge, then query.
    pub fn get_rules(&self) -> Result<Vec<a2s::Rule>, Error> {
        let challenge = self.get_challenge()?;
        let mut buf = [0; 16];
        let n = a2s::GetRules { challenge }.encode(&mut buf)?;
        let reply = self.query(&buf[..n])?;
        Ok(a2s::RulesResponse::decode(&reply)?.rules)
    }

    /// Installs the handler that receives this server's log events.
    pub fn set_event_handler<H>(&self, handler: H)
    where
        H: EventHandler + 'static,
    {
        *self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }

    /// Parses one received log payload and hands the event to the
    /// installed handler.
    ///
    /// Payloads that carry no log line are dropped silently; a line
    /// that matches the frame but no event pattern is returned as
    /// [`Error::UnknownEvent`] so the caller can surface it without
    /// stopping its receive loop.
    pub fn process_log(&self, payload: &[u8]) -> Result<(), Error> {
        self.ensure_live()?;
        let text = types::decode_text(payload);
        match event::parse(&text) {
            Ok(Some(event)) => {
                trace!("{}: event {} {}", self.addr, event.code(), event.name());
                let mut guard = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(handler) = guard.as_mut() {
                    handler.event(event);
                }
                Ok(())
            }
            Ok(None) => {
                trace!("{}: dropped log payload", self.addr);
                Ok(())
            }
            Err(ProtocolError::UnknownEvent(line)) => Err(Error::UnknownEvent(line)),
            Err(e) => Err(e.into()),
        }
    }

    /// Routes an error to the installed handler's error callback.
    pub(crate) fn handler_error(&self, error: Error) {
        let mut guard = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(handler) => handler.error(error),
            None => debug!("{}: log error dropped: {}", self.addr, error),
        }
    }

    /// Starts a receiver for log lines this server pushes directly to
    /// us: a UDP socket bound to `local` and connected to the server so
    /// other senders are filtered out.
    ///
    /// Use a shared [`LogListener`](crate::LogListener) instead when one
    /// port must serve many servers.
    pub fn start_log_listener(this: &Arc<Self>, local: SocketAddr) -> Result<(), Error> {
        this.ensure_live()?;
        let mut guard = this
            .log_reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.sock.is_some() {
            return Err(Error::AlreadyListening);
        }

        let sock = UdpSocket::bind(local)?;
        sock.connect(this.addr)?;
        sock.set_read_timeout(Some(REARM_INTERVAL))?;
        let reader = sock.try_clone()?;
        let running = Arc::new(AtomicBool::new(true));

        guard.sock = Some(sock);
        guard.running = running.clone();
        drop(guard);

        let server = Arc::clone(this);
        thread::spawn(move || {
            let mut buf = [0; MAX_DATAGRAM];
            while running.load(Ordering::SeqCst) {
                match reader.recv(&mut buf) {
                    Ok(n) => {
                        if let Err(e) = server.process_log(&buf[..n]) {
                            server.handler_error(e);
                        }
                    }
                    Err(e) => match Error::from_recv(e) {
                        Error::Timeout => continue,
                        _ => break,
                    },
                }
            }
            trace!("{}: log receiver stopped", server.addr);
        });
        Ok(())
    }

    /// Local endpoint of the per-server log receiver, if one runs.
    pub fn log_listener_addr(&self) -> Option<SocketAddr> {
        self.log_reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sock
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }

    /// Stops the per-server log receiver. Idempotent.
    pub fn stop_log_listener(&self) {
        let mut guard = self
            .log_reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.running.store(false, Ordering::SeqCst);
        guard.sock = None;
    }

    /// Marks the handle disposed and stops the log receiver. Every
    /// later operation fails with [`Error::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("{}: disposed", self.addr);
        self.stop_log_listener();
        *self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
