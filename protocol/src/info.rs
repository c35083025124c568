// SPDX-License-Identifier: LGPL-3.0-only

//! A2S_INFO reply parsing.
//!
//! Two layouts exist in the wild, selected by the type byte after the
//! packet header: `0x49` for Source servers and `0x6D` for GoldSrc
//! servers (which may append a mod description block).

use bitflags::bitflags;
use serde::Serialize;

use crate::cursor::Cursor;
use crate::types;
use crate::{a2s, Error};

/// Type byte of the Source layout.
pub const SOURCE_INFO: u8 = 0x49;

/// Type byte of the GoldSrc layout.
pub const GOLDSRC_INFO: u8 = 0x6d;

/// The operating system a game server runs on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// GNU/Linux.
    Linux,
    /// Microsoft Windows.
    Windows,
    /// Apple macOS.
    Mac,
    /// Anything else.
    #[default]
    Unknown,
}

impl From<u8> for Environment {
    fn from(value: u8) -> Self {
        match value {
            b'l' | b'L' => Self::Linux,
            b'w' | b'W' => Self::Windows,
            b'm' | b'o' => Self::Mac,
            _ => Self::Unknown,
        }
    }
}

/// How a game server is hosted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// Dedicated server.
    Dedicated,
    /// Listen server inside a game client.
    Listen,
    /// HLTV or SourceTV relay.
    Proxy,
    /// Anything else.
    #[default]
    Unknown,
}

impl From<u8> for ServerKind {
    fn from(value: u8) -> Self {
        match value {
            b'd' | b'D' => Self::Dedicated,
            b'l' | b'L' => Self::Listen,
            b'p' | b'P' => Self::Proxy,
            _ => Self::Unknown,
        }
    }
}

bitflags! {
    /// Extra-data flags announcing optional trailing fields of a Source
    /// info reply.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ExtraDataFlags: u8 {
        /// 64-bit game id follows.
        const GAME_ID   = 0x01;
        /// Server Steam id follows.
        const STEAM_ID  = 0x10;
        /// Keyword string follows.
        const KEYWORDS  = 0x20;
        /// SourceTV port and name follow.
        const SPECTATOR = 0x40;
        /// Game port follows.
        const PORT      = 0x80;
    }
}

/// Parsed A2S_INFO reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum ServerInfo {
    /// Source layout (`0x49`).
    Source(SourceInfo),
    /// GoldSrc layout (`0x6D`).
    GoldSrc(GoldSrcInfo),
}

impl ServerInfo {
    /// Decode a reply from `src`, dispatching on the type byte.
    pub fn decode(src: &[u8]) -> Result<Self, Error> {
        if src.len() < 5 {
            return Err(Error::InvalidPacket);
        }
        let mut cur = Cursor::new(src);
        cur.expect(&a2s::SINGLE_PACKET)?;
        match cur.get_u8()? {
            SOURCE_INFO => SourceInfo::decode_fields(cur, src).map(Self::Source),
            GOLDSRC_INFO => GoldSrcInfo::decode_fields(cur, src).map(Self::GoldSrc),
            _ => Err(Error::InvalidPacket),
        }
    }

    /// Server name.
    pub fn name(&self) -> &str {
        match self {
            Self::Source(info) => &info.name,
            Self::GoldSrc(info) => &info.name,
        }
    }

    /// Current map.
    pub fn map(&self) -> &str {
        match self {
            Self::Source(info) => &info.map,
            Self::GoldSrc(info) => &info.map,
        }
    }

    /// Current and maximum player counts.
    pub fn players(&self) -> (u8, u8) {
        match self {
            Self::Source(info) => (info.players, info.max_players),
            Self::GoldSrc(info) => (info.players, info.max_players),
        }
    }

    /// Raw reply bytes this value was decoded from.
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Source(info) => &info.data,
            Self::GoldSrc(info) => &info.data,
        }
    }
}

/// Source-layout info reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Protocol version.
    pub protocol: u8,
    /// Server name.
    pub name: String,
    /// Current map.
    pub map: String,
    /// Game directory, e.g. `cstrike`.
    pub folder: String,
    /// Game description.
    pub game: String,
    /// Steam application id.
    pub app_id: i16,
    /// Current number of players.
    pub players: u8,
    /// Maximum number of players.
    pub max_players: u8,
    /// Number of bots among the players.
    pub bots: u8,
    /// Hosting kind.
    pub kind: ServerKind,
    /// Host operating system.
    pub environment: Environment,
    /// Server is behind a password.
    pub password: bool,
    /// Server uses VAC.
    pub secure: bool,
    /// Game version string.
    pub version: String,
    /// Which optional trailing fields were present.
    #[serde(skip)]
    pub flags: ExtraDataFlags,
    /// Game port.
    pub port: Option<u16>,
    /// Server Steam id.
    pub steam_id: Option<u64>,
    /// SourceTV port.
    pub spectator_port: Option<u16>,
    /// SourceTV name.
    pub spectator_name: Option<String>,
    /// Comma-separated keywords.
    pub keywords: Option<String>,
    /// Full 64-bit game id.
    pub game_id: Option<u64>,
    /// Raw reply bytes.
    #[serde(skip)]
    pub data: Box<[u8]>,
}

impl SourceInfo {
    fn decode_fields(mut cur: Cursor, src: &[u8]) -> Result<Self, Error> {
        let mut info = Self {
            protocol: cur.get_u8()?,
            name: types::decode_text(cur.get_cstr()?),
            map: types::decode_text(cur.get_cstr()?),
            folder: types::decode_text(cur.get_cstr()?),
            game: types::decode_text(cur.get_cstr()?),
            app_id: cur.get_i16_le()?,
            players: cur.get_u8()?,
            max_players: cur.get_u8()?,
            bots: cur.get_u8()?,
            kind: cur.get_u8()?.into(),
            environment: cur.get_u8()?.into(),
            password: cur.get_u8()? != 0,
            secure: cur.get_u8()? != 0,
            version: types::decode_text(cur.get_cstr()?),
            data: Box::from(src),
            ..Self::default()
        };
        // pre-EDF replies stop right after the version string
        if !cur.has_remaining() {
            return Ok(info);
        }
        info.flags = ExtraDataFlags::from_bits_retain(cur.get_u8()?);
        if info.flags.contains(ExtraDataFlags::PORT) {
            info.port = Some(cur.get_u16_le()?);
        }
        if info.flags.contains(ExtraDataFlags::STEAM_ID) {
            info.steam_id = Some(cur.get_u64_le()?);
        }
        if info.flags.contains(ExtraDataFlags::SPECTATOR) {
            info.spectator_port = Some(cur.get_u16_le()?);
            info.spectator_name = Some(types::decode_text(cur.get_cstr()?));
        }
        if info.flags.contains(ExtraDataFlags::KEYWORDS) {
            info.keywords = Some(types::decode_text(cur.get_cstr()?));
        }
        if info.flags.contains(ExtraDataFlags::GAME_ID) {
            info.game_id = Some(cur.get_u64_le()?);
        }
        Ok(info)
    }
}

/// GoldSrc-layout info reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GoldSrcInfo {
    /// Game address as the server prints it.
    pub address: String,
    /// Server name.
    pub name: String,
    /// Current map.
    pub map: String,
    /// Game directory, e.g. `valve`.
    pub folder: String,
    /// Game description.
    pub game: String,
    /// Current number of players.
    pub players: u8,
    /// Maximum number of players.
    pub max_players: u8,
    /// Protocol version.
    pub protocol: u8,
    /// Hosting kind.
    pub kind: ServerKind,
    /// Host operating system.
    pub environment: Environment,
    /// Server is behind a password.
    pub password: bool,
    /// Mod description, present on modded servers only.
    pub mod_info: Option<ModInfo>,
    /// Server uses VAC.
    pub secure: bool,
    /// Number of bots among the players.
    pub bots: u8,
    /// Raw reply bytes.
    #[serde(skip)]
    pub data: Box<[u8]>,
}

impl GoldSrcInfo {
    fn decode_fields(mut cur: Cursor, src: &[u8]) -> Result<Self, Error> {
        let mut info = Self {
            address: types::decode_text(cur.get_cstr()?),
            name: types::decode_text(cur.get_cstr()?),
            map: types::decode_text(cur.get_cstr()?),
            folder: types::decode_text(cur.get_cstr()?),
            game: types::decode_text(cur.get_cstr()?),
            players: cur.get_u8()?,
            max_players: cur.get_u8()?,
            protocol: cur.get_u8()?,
            kind: cur.get_u8()?.into(),
            environment: cur.get_u8()?.into(),
            password: cur.get_u8()? != 0,
            data: Box::from(src),
            ..Self::default()
        };
        if cur.get_u8()? != 0 {
            info.mod_info = Some(ModInfo::decode_fields(&mut cur)?);
        }
        info.secure = cur.get_u8()? != 0;
        info.bots = cur.get_u8()?;
        Ok(info)
    }
}

/// Mod block of a GoldSrc info reply.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ModInfo {
    /// Mod home page.
    pub link: String,
    /// Mod download location.
    pub download_link: String,
    /// Mod version.
    pub version: i32,
    /// Download size in bytes.
    pub size: i32,
    /// Mod is multiplayer-only.
    pub server_only: bool,
    /// Mod ships its own client dll.
    pub custom_dll: bool,
}

impl ModInfo {
    fn decode_fields(cur: &mut Cursor) -> Result<Self, Error> {
        let link = types::decode_text(cur.get_cstr()?);
        let download_link = types::decode_text(cur.get_cstr()?);
        // unused NUL between the links and the version
        cur.get_u8()?;
        Ok(Self {
            link,
            download_link,
            version: cur.get_i32_le()?,
            size: cur.get_i32_le()?,
            server_only: cur.get_u8()? != 0,
            custom_dll: cur.get_u8()? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_reply() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"\xff\xff\xff\xff\x49");
        buf.push(47); // protocol
        buf.extend_from_slice(b"Fortress\0de_dust2\0cstrike\0Counter-Strike\0");
        buf.extend_from_slice(&240i16.to_le_bytes());
        buf.extend_from_slice(&[12, 32, 2]); // players, max, bots
        buf.extend_from_slice(b"dl\x00\x01"); // dedicated, linux, password, secure
        buf.extend_from_slice(b"1.37.1.1\0");
        buf.push(0x80 | 0x10); // port + steam id
        buf.extend_from_slice(&27015u16.to_le_bytes());
        buf.extend_from_slice(&90071992547409u64.to_le_bytes());
        buf
    }

    #[test]
    fn source_info() {
        let src = source_reply();
        let info = match ServerInfo::decode(&src).unwrap() {
            ServerInfo::Source(info) => info,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(info.protocol, 47);
        assert_eq!(info.name, "Fortress");
        assert_eq!(info.map, "de_dust2");
        assert_eq!(info.app_id, 240);
        assert_eq!(info.players, 12);
        assert_eq!(info.max_players, 32);
        assert_eq!(info.bots, 2);
        assert_eq!(info.kind, ServerKind::Dedicated);
        assert_eq!(info.environment, Environment::Linux);
        assert!(!info.password);
        assert!(info.secure);
        assert_eq!(info.version, "1.37.1.1");
        assert_eq!(info.port, Some(27015));
        assert_eq!(info.steam_id, Some(90071992547409));
        assert_eq!(info.keywords, None);
    }

    #[test]
    fn source_info_without_extra_data() {
        let mut src = source_reply();
        src.truncate(src.len() - 11);
        let info = match ServerInfo::decode(&src).unwrap() {
            ServerInfo::Source(info) => info,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(info.flags, ExtraDataFlags::empty());
        assert_eq!(info.port, None);
    }

    fn goldsrc_reply(is_mod: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"\xff\xff\xff\xff\x6d");
        buf.extend_from_slice(b"192.168.0.1:27015\0Half-Life DM\0crossfire\0valve\0Half-Life\0");
        buf.extend_from_slice(&[3, 16, 47]); // players, max, protocol
        buf.extend_from_slice(b"dw\x01"); // dedicated, windows, password
        if is_mod {
            buf.push(1);
            buf.extend_from_slice(b"http://mod.example\0http://dl.example\0\0");
            buf.extend_from_slice(&10i32.to_le_bytes());
            buf.extend_from_slice(&1048576i32.to_le_bytes());
            buf.extend_from_slice(&[0, 1]); // server_only, custom_dll
        } else {
            buf.push(0);
        }
        buf.extend_from_slice(&[1, 2]); // secure, bots
        buf
    }

    #[test]
    fn goldsrc_info_with_mod() {
        let src = goldsrc_reply(true);
        let info = match ServerInfo::decode(&src).unwrap() {
            ServerInfo::GoldSrc(info) => info,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(info.address, "192.168.0.1:27015");
        assert_eq!(info.name, "Half-Life DM");
        assert_eq!(info.protocol, 47);
        assert_eq!(info.environment, Environment::Windows);
        assert!(info.password);
        let mod_info = info.mod_info.expect("mod block");
        assert_eq!(mod_info.link, "http://mod.example");
        assert_eq!(mod_info.version, 10);
        assert_eq!(mod_info.size, 1048576);
        assert!(!mod_info.server_only);
        assert!(mod_info.custom_dll);
        // secure and bots come after the mod block
        assert!(info.secure);
        assert_eq!(info.bots, 2);
    }

    #[test]
    fn goldsrc_info_without_mod() {
        let src = goldsrc_reply(false);
        let info = match ServerInfo::decode(&src).unwrap() {
            ServerInfo::GoldSrc(info) => info,
            other => panic!("wrong variant: {other:?}"),
        };
        assert_eq!(info.mod_info, None);
        assert!(info.secure);
        assert_eq!(info.bots, 2);
    }

    #[test]
    fn reparsing_data_is_identity() {
        let src = goldsrc_reply(true);
        let first = ServerInfo::decode(&src).unwrap();
        let second = ServerInfo::decode(first.data()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn too_short() {
        assert_eq!(
            ServerInfo::decode(b"\xff\xff\xff\xff"),
            Err(Error::InvalidPacket)
        );
    }

    #[test]
    fn unknown_type_byte() {
        assert_eq!(
            ServerInfo::decode(b"\xff\xff\xff\xff\x7a"),
            Err(Error::InvalidPacket)
        );
    }
}
