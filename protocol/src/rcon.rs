// SPDX-License-Identifier: LGPL-3.0-only

//! Source RCON packet framing.
//!
//! On the wire a packet is `size ‖ id ‖ kind ‖ body ‖ 0x00 ‖ 0x00` with
//! every integer little-endian and `size` counting everything after
//! itself, so an empty body yields the minimum size of 10.

use serde::Serialize;

use crate::cursor::Cursor;
use crate::types;
use crate::Error;

/// Smallest legal value of the size field.
pub const MIN_PACKET_SIZE: i32 = 10;

/// Largest value of the size field this crate accepts: the framing
/// around a 4096-byte body, which is the biggest packet servers send.
pub const MAX_PACKET_SIZE: i32 = MIN_PACKET_SIZE + 4096;

/// Id a server puts into the auth response when the password was wrong.
pub const AUTH_FAILED_ID: i32 = -1;

/// Packet kind.
///
/// `EXEC` requests and `AUTH_RESPONSE` replies share the value 2; the
/// direction of travel disambiguates them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum PacketKind {
    /// `SERVERDATA_RESPONSE_VALUE` — command output.
    ResponseValue = 0,
    /// `SERVERDATA_EXECCOMMAND` going out, `SERVERDATA_AUTH_RESPONSE`
    /// coming back.
    ExecOrAuthResponse = 2,
    /// `SERVERDATA_AUTH` — the authentication request.
    Auth = 3,
}

impl TryFrom<i32> for PacketKind {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Error> {
        match value {
            0 => Ok(Self::ResponseValue),
            2 => Ok(Self::ExecOrAuthResponse),
            3 => Ok(Self::Auth),
            _ => Err(Error::InvalidPacket),
        }
    }
}

/// One Source RCON packet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Packet {
    /// Request id chosen by the client and echoed by the server.
    pub id: i32,
    /// Packet kind.
    pub kind: PacketKind,
    /// Packet body without the terminating NUL.
    pub body: String,
}

impl Packet {
    /// Creates an authentication request carrying `password`.
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            kind: PacketKind::Auth,
            body: password.to_owned(),
        }
    }

    /// Creates a command execution request.
    pub fn exec(id: i32, command: &str) -> Self {
        Self {
            id,
            kind: PacketKind::ExecOrAuthResponse,
            body: command.to_owned(),
        }
    }

    /// Creates a command output packet. Servers send these; the library
    /// builds them only in tests.
    pub fn response(id: i32, body: &str) -> Self {
        Self {
            id,
            kind: PacketKind::ResponseValue,
            body: body.to_owned(),
        }
    }

    /// Encodes the packet including its size prefix.
    pub fn encode(&self) -> Vec<u8> {
        let body = types::encode_text(&self.body);
        let size = MIN_PACKET_SIZE + body.len() as i32;
        let mut buf = Vec::with_capacity(4 + size as usize);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&(self.kind as i32).to_le_bytes());
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Decodes a packet from a buffer that starts with the size field.
    pub fn decode(src: &[u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(src);
        let size = cur.get_i32_le()?;
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
            return Err(Error::InvalidPacketSize(size));
        }
        Self::decode_payload(cur.get_bytes(size as usize)?)
    }

    /// Decodes the part after the size field, which must be exactly
    /// `size` bytes long.
    pub fn decode_payload(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < MIN_PACKET_SIZE as usize {
            return Err(Error::InvalidPacketSize(payload.len() as i32));
        }
        let mut cur = Cursor::new(payload);
        let id = cur.get_i32_le()?;
        let kind = PacketKind::try_from(cur.get_i32_le()?)?;
        let rest = cur.end();
        let (body, tail) = rest.split_at(rest.len() - 2);
        if tail != [0, 0] {
            return Err(Error::InvalidPacket);
        }
        Ok(Self {
            id,
            kind,
            body: types::decode_text(body),
        })
    }
}
