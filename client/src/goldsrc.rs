// SPDX-License-Identifier: GPL-3.0-only

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use regex::Regex;

use hlds_protocol::status::StatusInfo;
use hlds_protocol::types;
use hlds_protocol::Error as ProtocolError;

use crate::server::{Engine, Server};
use crate::Error;

/// Challenge slot value while no nonce has been acquired.
const CHALLENGE_EMPTY: i64 = -1;

/// Handle for a GoldSrc server.
///
/// GoldSrc RCON is connectionless: a challenge nonce is fetched over
/// UDP once, then every command is a single datagram carrying the
/// nonce and the password. The nonce is shared by clones of this
/// handle and survives until [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct GoldSrcServer {
    server: Arc<Server>,
    challenge: Arc<AtomicI64>,
}

impl GoldSrcServer {
    /// Creates a handle bound to `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            server: Server::new(Engine::GoldSrc, addr),
            challenge: Arc::new(AtomicI64::new(CHALLENGE_EMPTY)),
        }
    }

    /// The engine-agnostic core, usable with
    /// [`LogListener`](crate::LogListener).
    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Acquired RCON challenge nonce, if any.
    pub fn rcon_challenge(&self) -> Option<i64> {
        match self.challenge.load(Ordering::SeqCst) {
            CHALLENGE_EMPTY => None,
            nonce => Some(nonce),
        }
    }

    /// Fetches a fresh RCON challenge nonce from the server.
    pub fn challenge_rcon(&self) -> Result<(), Error> {
        let reply = self.server.query(b"\xff\xff\xff\xffchallenge rcon\n")?;
        let text = types::decode_text(&reply);
        match regex!(r"^....challenge rcon (\d+)").captures(&text) {
            Some(cap) => match cap[1].parse() {
                Ok(nonce) => {
                    trace!("{}: rcon challenge {nonce}", self.server.addr());
                    self.challenge.store(nonce, Ordering::SeqCst);
                    Ok(())
                }
                Err(_) => Err(Error::BadRconChallenge),
            },
            None => Err(Error::BadRconChallenge),
        }
    }

    fn challenge_or_acquire(&self) -> Result<i64, Error> {
        match self.challenge.load(Ordering::SeqCst) {
            CHALLENGE_EMPTY => {
                self.challenge_rcon()?;
                Ok(self.challenge.load(Ordering::SeqCst))
            }
            nonce => Ok(nonce),
        }
    }

    fn rcon_request(&self, command: &str) -> Result<Vec<u8>, Error> {
        let nonce = self.challenge_or_acquire()?;
        let body = format!(
            "rcon {} \"{}\" {}",
            nonce,
            self.server.password(),
            command
        );
        let mut request = b"\xff\xff\xff\xff".to_vec();
        request.extend_from_slice(&types::encode_text(&body));
        Ok(request)
    }

    /// Fires an RCON command and does not read any reply.
    pub fn send_rcon(&self, command: &str) -> Result<(), Error> {
        let request = self.rcon_request(command)?;
        self.server.send(&request)
    }

    /// Sends an RCON command and returns the textual reply.
    pub fn query_rcon(&self, command: &str) -> Result<String, Error> {
        let request = self.rcon_request(command)?;
        let reply = self.server.query(&request)?;
        // skip the four header bytes and the print opcode
        let text: String = types::decode_text(&reply).chars().skip(5).collect();
        let lower = text.to_ascii_lowercase();
        if lower.starts_with("bad challenge.") {
            return Err(Error::BadRconChallenge);
        }
        if lower.starts_with("bad rcon_password.") {
            return Err(Error::BadRconPassword);
        }
        Ok(text)
    }

    /// Probes the configured password by echoing a random token through
    /// the server. A rejected password reads as `Ok(false)`; challenge
    /// failures and socket errors propagate.
    pub fn is_rcon_password_valid(&self) -> Result<bool, Error> {
        if self.rcon_challenge().is_none() {
            self.challenge_rcon()?;
        }
        let token = format!("{:08x}", fastrand::u32(..));
        match self.query_rcon(&format!("echo {token}")) {
            Ok(reply) => Ok(reply.contains(&token)),
            Err(Error::BadRconPassword) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads a cvar; GoldSrc replies `"name" is "value"`.
    pub fn get_cvar(&self, name: &str) -> Result<String, Error> {
        let reply = self.query_rcon(name)?;
        let re = Regex::new(&format!(
            r#"(?i)"{}" is "([^"]*)""#,
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

    /// Turns server logging on. Fire-and-forget.
    pub fn start_log(&self) -> Result<(), Error> {
        self.send_rcon("log on")
    }

    /// Turns server logging off. Fire-and-forget.
    pub fn stop_log(&self) -> Result<(), Error> {
        self.send_rcon("log off")
    }

    /// Lists the endpoints the server pushes log lines to.
    ///
    /// Sent as a bare `logaddress_add`: the server answers the missing
    /// argument by printing its current list.
    pub fn get_log_addresses(&self) -> Result<Vec<SocketAddr>, Error> {
        let reply = self.query_rcon("logaddress_add")?;
        let mut out = Vec::new();
        for cap in regex!(r"current:\s+(\S+?):(\d+)").captures_iter(&reply) {
            match format!("{}:{}", &cap[1], &cap[2]).parse() {
                Ok(addr) => out.push(addr),
                Err(_) => debug!("unparsable log address in {:?}", &cap[0]),
            }
        }
        Ok(out)
    }

    /// Registers `addr` as a log sink on the server.
    pub fn add_log_address(&self, addr: SocketAddr) -> Result<(), Error> {
        let reply = self.query_rcon(&format!("logaddress_add {} {}", addr.ip(), addr.port()))?;
        check_log_reply(&reply, &format!("logaddress_add:  {}:{}", addr.ip(), addr.port()))
    }

    /// Removes `addr` from the server's log sinks.
    pub fn delete_log_address(&self, addr: SocketAddr) -> Result<(), Error> {
        let reply = self.query_rcon(&format!("logaddress_del {} {}", addr.ip(), addr.port()))?;
        check_log_reply(&reply, &format!("deleting:  {}:{}", addr.ip(), addr.port()))
    }

    /// Runs `status` and parses the GoldSrc table.
    pub fn get_status(&self) -> Result<StatusInfo, Error> {
        Ok(StatusInfo::parse_goldsrc(&self.query_rcon("status")?)?)
    }

    /// Disposes the handle: clears the challenge nonce and shuts down
    /// the core (log receiver included).
    pub fn dispose(&self) {
        self.challenge.store(CHALLENGE_EMPTY, Ordering::SeqCst);
        self.server.dispose();
    }
}

impl Deref for GoldSrcServer {
    type Target = Server;

    fn deref(&self) -> &Server {
        &self.server
    }
}

/// Maps a log-address reply onto the error taxonomy: recognized failure
/// strings first, then the success marker, anything else is a
/// [`Error::GameServer`] carrying the reply.
pub(crate) fn check_log_reply(reply: &str, success: &str) -> Result<(), Error> {
    let lower = reply.to_ascii_lowercase();
    if lower.contains("unable to resolve") {
        return Err(Error::UnableToResolve);
    }
    if lower.contains("already in list") {
        return Err(Error::AddressAlreadyInList);
    }
    if lower.contains("no addresses added") {
        return Err(Error::NoAddressesAdded);
    }
    if lower.contains("couldn't find address") {
        return Err(Error::AddressNotFound);
    }
    if reply.contains(success) {
        return Ok(());
    }
    Err(Error::GameServer(reply.to_owned()))
}
