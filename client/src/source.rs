// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::ops::Deref;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace};
use regex::Regex;

use hlds_protocol::rcon::{self, Packet, PacketKind};
use hlds_protocol::status::StatusInfo;
use hlds_protocol::Error as ProtocolError;

use crate::goldsrc::check_log_reply;
use crate::server::{Engine, Server};
use crate::Error;

struct RconSession {
    /// The TCP stream, held for the whole emit-then-collect sequence of
    /// each command so requests never interleave on the wire.
    stream: Mutex<Option<TcpStream>>,
    /// Clone of the stream used to shut it down without taking the
    /// stream lock, so a blocked reader can be interrupted.
    ctrl: Mutex<Option<TcpStream>>,
    /// Post-incremented on every packet sent; monotonic for the whole
    /// session, which is what the flush-sentinel collect relies on.
    next_id: AtomicI32,
}

impl RconSession {
    fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Handle for a Source server.
///
/// Source RCON is a TCP session: connect, authenticate once, then run
/// commands over length-prefixed packets. Multi-packet replies carry no
/// length information; the client sends an empty "flush" command right
/// after the real one and collects output until the server echoes the
/// flush id back.
#[derive(Clone)]
pub struct SourceServer {
    server: Arc<Server>,
    session: Arc<RconSession>,
}

impl SourceServer {
    /// Creates a handle bound to `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            server: Server::new(Engine::Source, addr),
            session: Arc::new(RconSession {
                stream: Mutex::new(None),
                ctrl: Mutex::new(None),
                next_id: AtomicI32::new(0),
            }),
        }
    }

    /// The engine-agnostic core, usable with
    /// [`LogListener`](crate::LogListener).
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// True while an authenticated session is open.
    pub fn is_connected(&self) -> bool {
        self.session
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Connects and authenticates with the configured password.
    ///
    /// The server answers an AUTH packet with an empty response value
    /// (discarded) followed by the auth response; an id of `-1` there
    /// means the password was rejected. Returns whether the reply kind
    /// was the expected auth response. On any failure the socket is
    /// closed and the session stays disconnected.
    pub fn connect_rcon(&self) -> Result<bool, Error> {
        self.server.ensure_live()?;
        let mut guard = self
            .session
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let addr = self.server.addr();
        let mut stream = match self.server.timeout() {
            Some(t) => TcpStream::connect_timeout(&addr, t)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_read_timeout(self.server.timeout())?;

        let id = self.session.next_id();
        trace!("{addr}: rcon auth, packet id {id}");
        stream.write_all(&Packet::auth(id, &self.server.password()).encode())?;

        let mut reply = read_packet(&mut stream)?;
        if reply.kind == PacketKind::ResponseValue {
            reply = read_packet(&mut stream)?;
        }
        if reply.id == rcon::AUTH_FAILED_ID {
            debug!("{addr}: rcon password rejected");
            return Err(Error::BadRconPassword);
        }

        *self
            .session
            .ctrl
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = stream.try_clone().ok();
        let ok = reply.kind == PacketKind::ExecOrAuthResponse;
        *guard = Some(stream);
        Ok(ok)
    }

    /// Shuts the session down. Idempotent when already disconnected.
    pub fn disconnect_rcon(&self) -> Result<(), Error> {
        self.server.ensure_live()?;
        self.disconnect_inner();
        Ok(())
    }

    fn disconnect_inner(&self) {
        if let Some(ctrl) = self
            .session
            .ctrl
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = ctrl.shutdown(Shutdown::Both);
        }
        if let Some(stream) = self
            .session
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Runs a command and collects its complete output.
    ///
    /// Two packets go out back to back: the command with id P1 and an
    /// empty flush command with id P2. Replies with id P1 are
    /// concatenated; the first packet with id ≥ P2 ends the collection.
    /// EOF or a receive timeout also end it, returning what arrived.
    pub fn query_rcon(&self, command: &str) -> Result<String, Error> {
        self.server.ensure_live()?;
        let mut guard = self
            .session
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;

        let exec_id = self.session.next_id();
        let flush_id = self.session.next_id();
        trace!(
            "{}: rcon exec {:?}, packet ids {exec_id}/{flush_id}",
            self.server.addr(),
            command
        );
        stream.write_all(&Packet::exec(exec_id, command).encode())?;
        stream.write_all(&Packet::exec(flush_id, "").encode())?;

        let mut out = String::new();
        loop {
            let packet = match read_packet(stream) {
                Ok(packet) => packet,
                Err(Error::Timeout) => break,
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            };
            if packet.id >= flush_id {
                break;
            }
            if packet.id == exec_id {
                out.push_str(&packet.body);
            }
        }
        Ok(out)
    }

    /// Reads a cvar; Source replies `"name" = "value"`.
    pub fn get_cvar(&self, name: &str) -> Result<String, Error> {
        let reply = self.query_rcon(name)?;
        let re = Regex::new(&format!(
            r#"(?i)"{}" = "([^"]*)""#,
            regex::escape(name)
        ))
        .expect("escaped cvar name");
        match re.captures(&reply) {
            Some(cap) => Ok(cap[1].to_owned()),
            None => Err(Error::Format(ProtocolError::InvalidFormat(reply))),
        }
    }

    /// Sets a cvar.
    pub fn set_cvar(&self, name: &str, value: &str) -> Result<(), Error> {
        self.query_rcon(&format!("{name} \"{value}\"")).map(|_| ())
    }

    /// True when the server is writing a log.
    pub fn is_logging(&self) -> Result<bool, Error> {
        let reply = self.query_rcon("log")?;
        Ok(!reply.to_ascii_lowercase().contains("not currently logging"))
    }

    /// Turns server logging on.
    pub fn start_log(&self) -> Result<(), Error> {
        self.query_rcon("log on").map(|_| ())
    }

    /// Turns server logging off.
    pub fn stop_log(&self) -> Result<(), Error> {
        self.query_rcon("log off").map(|_| ())
    }

    /// Lists the endpoints the server pushes log lines to.
    pub fn get_log_addresses(&self) -> Result<Vec<SocketAddr>, Error> {
        let reply = self.query_rcon("logaddress_list")?;
        let mut out = Vec::new();
        for cap in regex!(r"(\d{1,3}(?:\.\d{1,3}){3}):(\d{1,5})").captures_iter(&reply) {
            if let Ok(addr) = cap[0].parse() {
                out.push(addr);
            }
        }
        Ok(out)
    }

    /// Registers `addr` as a log sink on the server.
    pub fn add_log_address(&self, addr: SocketAddr) -> Result<(), Error> {
        let reply = self.query_rcon(&format!("logaddress_add {}:{}", addr.ip(), addr.port()))?;
        check_log_reply(&reply, "logaddress_add:  ")
    }

    /// Removes `addr` from the server's log sinks.
    pub fn delete_log_address(&self, addr: SocketAddr) -> Result<(), Error> {
        let reply = self.query_rcon(&format!("logaddress_del {} {}", addr.ip(), addr.port()))?;
        check_log_reply(&reply, "logaddress_del:  ")
    }

    /// Runs `status` and parses the Source table.
    pub fn get_status(&self) -> Result<StatusInfo, Error> {
        Ok(StatusInfo::parse_source(&self.query_rcon("status")?)?)
    }

    /// Disposes the handle: tears the TCP session down first so a
    /// blocked reader on another thread fails with an I/O error, then
    /// shuts the core down.
    pub fn dispose(&self) {
        self.disconnect_inner();
        self.server.dispose();
    }
}

impl Deref for SourceServer {
    type Target = Server;

    fn deref(&self) -> &Server {
        &self.server
    }
}

/// Reads one length-prefixed packet, looping until the announced size
/// has been accumulated — a single `read` may return short.
fn read_packet(stream: &mut TcpStream) -> Result<Packet, Error> {
    let mut head = [0; 4];
    stream.read_exact(&mut head).map_err(Error::from_recv)?;
    let size = i32::from_le_bytes(head);
    if !(rcon::MIN_PACKET_SIZE..=rcon::MAX_PACKET_SIZE).contains(&size) {
        return Err(Error::Format(ProtocolError::InvalidPacketSize(size)));
    }
    let mut payload = vec![0; size as usize];
    stream.read_exact(&mut payload).map_err(Error::from_recv)?;
    Ok(Packet::decode_payload(&payload)?)
}
