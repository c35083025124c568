// SPDX-License-Identifier: LGPL-3.0-only

//! A2S query packets.
//!
//! Requests all share the single-packet header followed by a one-byte
//! opcode; replies mirror the header with a response opcode. Large
//! replies arrive split across datagrams, each carrying one of the two
//! fragment header layouts below.

use serde::Serialize;

use crate::cursor::{Cursor, CursorMut};
use crate::types;
use crate::Error;

/// Leading header of a reply contained in a single datagram.
pub const SINGLE_PACKET: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// Leading header of a reply split across several datagrams.
pub const SPLIT_PACKET: [u8; 4] = [0xfe, 0xff, 0xff, 0xff];

/// Challenge value a server returns when it refuses to issue one.
///
/// `0xFFFFFFFF` read as a signed little-endian integer.
pub const CHALLENGE_EMPTY: i32 = -1;

/// A2S_PING request.
#[derive(Clone, Debug, PartialEq)]
pub struct Ping;

impl Ping {
    /// Complete request datagram.
    pub const REQUEST: &'static [u8] = b"\xff\xff\xff\xff\x69";

    /// Reply opcode at offset 4.
    pub const RESPONSE: u8 = 0x6a;

    /// Returns true if `src` is a ping reply.
    pub fn is_response(src: &[u8]) -> bool {
        src.get(4) == Some(&Self::RESPONSE)
    }
}

/// A2S_SERVERQUERY_GETCHALLENGE request.
#[derive(Clone, Debug, PartialEq)]
pub struct GetChallenge;

impl GetChallenge {
    /// Complete request datagram: opcode `0x55` with the sentinel
    /// challenge.
    pub const REQUEST: &'static [u8] = b"\xff\xff\xff\xff\x55\xff\xff\xff\xff";
}

/// Reply to [`GetChallenge`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChallengeResponse {
    /// Challenge to echo back in player and rules queries.
    pub challenge: i32,
}

impl ChallengeResponse {
    /// Reply opcode.
    pub const RESPONSE: u8 = 0x41;

    /// Decode packet from `src`.
    pub fn decode(src: &[u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(src);
        cur.expect(&SINGLE_PACKET)?;
        if cur.get_u8()? != Self::RESPONSE {
            return Err(Error::InvalidPacket);
        }
        Ok(Self {
            challenge: cur.get_i32_le()?,
        })
    }
}

/// A2S_INFO request.
#[derive(Clone, Debug, PartialEq)]
pub struct GetInfo;

impl GetInfo {
    /// Complete request datagram: opcode `0x54` and a fixed payload
    /// string every engine revision expects verbatim.
    pub const REQUEST: &'static [u8] = b"\xff\xff\xff\xff\x54Source Engine Query\0";
}

/// A2S_PLAYER request.
#[derive(Clone, Debug, PartialEq)]
pub struct GetPlayers {
    /// Challenge obtained from [`GetChallenge`].
    pub challenge: i32,
}

impl GetPlayers {
    /// Request opcode.
    pub const HEADER: u8 = 0x55;

    /// Encode packet to `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(CursorMut::new(buf)
            .put_bytes(&SINGLE_PACKET)?
            .put_u8(Self::HEADER)?
            .put_i32_le(self.challenge)?
            .pos())
    }
}

/// One entry of an A2S_PLAYER reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerInfo {
    /// Slot index.
    pub index: u8,
    /// Player name.
    pub name: String,
    /// Kill count.
    pub kills: i32,
    /// Seconds since the player connected.
    pub duration: f32,
}

/// Reply to [`GetPlayers`].
#[derive(Clone, Debug, PartialEq)]
pub struct PlayersResponse {
    /// Connected players in slot order.
    pub players: Vec<PlayerInfo>,
}

impl PlayersResponse {
    /// Reply opcode.
    pub const RESPONSE: u8 = 0x44;

    /// Decode packet from `src`.
    pub fn decode(src: &[u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(src);
        cur.expect(&SINGLE_PACKET)?;
        if cur.get_u8()? != Self::RESPONSE {
            return Err(Error::InvalidPacket);
        }
        let count = cur.get_u8()?;
        let mut players = Vec::with_capacity(count as usize);
        for _ in 0..count {
            players.push(PlayerInfo {
                index: cur.get_u8()?,
                name: types::decode_text(cur.get_cstr()?),
                kills: cur.get_i32_le()?,
                duration: cur.get_f32_le()?,
            });
        }
        Ok(Self { players })
    }
}

/// A2S_RULES request.
#[derive(Clone, Debug, PartialEq)]
pub struct GetRules {
    /// Challenge obtained from [`GetChallenge`].
    pub challenge: i32,
}

impl GetRules {
    /// Request opcode.
    pub const HEADER: u8 = 0x56;

    /// Encode packet to `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(CursorMut::new(buf)
            .put_bytes(&SINGLE_PACKET)?
            .put_u8(Self::HEADER)?
            .put_i32_le(self.challenge)?
            .pos())
    }
}

/// One server rule: a cvar name and its value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rule {
    /// Cvar name.
    pub name: String,
    /// Cvar value.
    pub value: String,
}

/// Reply to [`GetRules`].
#[derive(Clone, Debug, PartialEq)]
pub struct RulesResponse {
    /// Rules in reply order.
    pub rules: Vec<Rule>,
}

impl RulesResponse {
    /// Reply opcode.
    pub const RESPONSE: u8 = 0x45;

    /// Decode packet from `src`.
    pub fn decode(src: &[u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(src);
        cur.expect(&SINGLE_PACKET)?;
        if cur.get_u8()? != Self::RESPONSE {
            return Err(Error::InvalidPacket);
        }
        let count = cur.get_i16_le()?.max(0);
        let mut rules = Vec::with_capacity(count as usize);
        for _ in 0..count {
            rules.push(Rule {
                name: types::decode_text(cur.get_cstr()?),
                value: types::decode_text(cur.get_cstr()?),
            });
        }
        Ok(Self { rules })
    }
}

/// One fragment of a split reply with its header stripped.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitFragment<'a> {
    /// Group id shared by every fragment of one reply.
    pub id: i32,
    /// Total number of fragments in the group.
    pub total: u8,
    /// Zero-based position of this fragment.
    pub index: u8,
    /// Fragment payload.
    pub payload: &'a [u8],
}

impl<'a> SplitFragment<'a> {
    /// Decode a GoldSrc fragment: 9-byte header, packet counts packed
    /// into the nibbles of byte 8 (low = total, high = index).
    pub fn goldsrc(src: &'a [u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(src);
        cur.expect(&SPLIT_PACKET)?;
        let id = cur.get_i32_le()?;
        let n = cur.get_u8()?;
        Ok(Self {
            id,
            total: n & 0x0f,
            index: n >> 4,
            payload: cur.end(),
        })
    }

    /// Decode an OrangeBox fragment: 12-byte header with whole bytes for
    /// the total (offset 8) and index (offset 9) and a split size that is
    /// ignored here.
    pub fn orangebox(src: &'a [u8]) -> Result<Self, Error> {
        let mut cur = Cursor::new(src);
        cur.expect(&SPLIT_PACKET)?;
        let id = cur.get_i32_le()?;
        let total = cur.get_u8()?;
        let index = cur.get_u8()?;
        cur.get_i16_le()?;
        Ok(Self {
            id,
            total,
            index,
            payload: cur.end(),
        })
    }
}
