// SPDX-License-Identifier: LGPL-3.0-only

//! RCON `status` reply parsing.
//!
//! The two engines print different tables: GoldSrc labels the endpoint
//! `tcp/ip`, counts players as `N active (M max)` and closes the user
//! block with a `N users` line; Source labels the endpoint `udp/ip`,
//! counts players as `N (M max)` and has no trailing count. The dialect
//! is chosen by the caller, never sniffed.

use std::time::Duration;

use log::debug;
use serde::Serialize;

use crate::Error;

/// Parsed `status` reply.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusInfo {
    /// Server hostname.
    pub hostname: String,
    /// Version line as printed.
    pub version: String,
    /// Endpoint line as printed.
    pub address: String,
    /// Current map.
    pub map: String,
    /// Player count from the `players` line.
    pub active_players: u32,
    /// Player limit from the `players` line.
    pub max_players: u32,
    /// Count from the trailing `N users` line; GoldSrc replies only.
    ///
    /// Kept separate from `active_players` because the two columns come
    /// from different places and servers have been seen to disagree.
    pub tail_user_count: Option<u32>,
    /// Connected users in table order.
    pub users: Vec<User>,
    /// The reply text this value was parsed from.
    pub raw: String,
}

/// One row of the user table.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum User {
    /// A regular player.
    Normal(UserInfo),
    /// The HLTV spectator proxy.
    Hltv(HltvInfo),
}

/// A regular user row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserInfo {
    /// Player name.
    pub name: String,
    /// Server user id.
    pub user_id: i32,
    /// Steam auth id.
    pub auth_id: String,
    /// Frag count.
    pub frags: i32,
    /// Time connected.
    pub time: Duration,
    /// Latency in milliseconds.
    pub ping: u32,
    /// Packet loss percentage.
    pub loss: u32,
    /// Peer address column as printed.
    pub address: String,
}

/// The HLTV row; replaces frag, ping and loss columns with relay state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HltvInfo {
    /// Proxy name.
    pub name: String,
    /// Server user id.
    pub user_id: i32,
    /// Connected spectators.
    pub spectators: u32,
    /// Spectator slots.
    pub slots: u32,
    /// Broadcast delay in seconds.
    pub delay: u32,
    /// Peer address column as printed.
    pub address: String,
}

impl HltvInfo {
    /// Literal standing in for the auth id in HLTV rows.
    pub const AUTH_ID: &'static str = "HLTV";
}

impl StatusInfo {
    /// Parses a GoldSrc `status` reply.
    pub fn parse_goldsrc(text: &str) -> Result<Self, Error> {
        let re = regex!(
            r"(?s)hostname\s*:\s+([^\r\n]+?)\s*\r?\n.*?version\s*:\s+([^\r\n]+?)\s*\r?\n.*?tcp/ip\s*:\s+([^\r\n]+?)\s*\r?\n.*?map\s*:\s+(\S+)[^\r\n]*\r?\n.*?players\s*:\s+(\d+) active \((\d+) max\)[^\r\n]*\r?\n(.*)\n\s*(\d+) users"
        );
        let cap = re
            .captures(text)
            .ok_or_else(|| Error::InvalidFormat(text.to_owned()))?;
        Ok(Self {
            hostname: cap[1].to_owned(),
            version: cap[2].to_owned(),
            address: cap[3].to_owned(),
            map: cap[4].to_owned(),
            active_players: cap[5].parse().unwrap_or(0),
            max_players: cap[6].parse().unwrap_or(0),
            tail_user_count: cap[8].parse().ok(),
            users: parse_users(&cap[7]),
            raw: text.to_owned(),
        })
    }

    /// Parses a Source `status` reply.
    pub fn parse_source(text: &str) -> Result<Self, Error> {
        let re = regex!(
            r"(?s)hostname\s*:\s+([^\r\n]+?)\s*\r?\n.*?version\s*:\s+([^\r\n]+?)\s*\r?\n.*?udp/ip\s*:\s+([^\r\n]+?)\s*\r?\n.*?map\s*:\s+(\S+)[^\r\n]*\r?\n.*?players\s*:\s+(\d+)[^(\r\n]*\((\d+) max\)[^\r\n]*\r?\n(.*)$"
        );
        let cap = re
            .captures(text)
            .ok_or_else(|| Error::InvalidFormat(text.to_owned()))?;
        Ok(Self {
            hostname: cap[1].to_owned(),
            version: cap[2].to_owned(),
            address: cap[3].to_owned(),
            map: cap[4].to_owned(),
            active_players: cap[5].parse().unwrap_or(0),
            max_players: cap[6].parse().unwrap_or(0),
            tail_user_count: None,
            users: parse_users(&cap[7]),
            raw: text.to_owned(),
        })
    }
}

/// Parses the user table; lines matching neither row shape are dropped.
fn parse_users(block: &str) -> Vec<User> {
    let mut users = Vec::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(user) = parse_normal(line) {
            users.push(User::Normal(user));
        } else if let Some(hltv) = parse_hltv(line) {
            users.push(User::Hltv(hltv));
        } else {
            debug!("dropped status line {:?}", line);
        }
    }
    users
}

fn parse_normal(line: &str) -> Option<UserInfo> {
    let re = regex!(
        r#"^#\s*\d+\s+"(.*)"\s+(\d+)\s+(\S+)\s+(-?\d+)\s+(\d+(?::\d+)*)\s+(\d+)\s+(\d+)\s+(\S+)$"#
    );
    let cap = re.captures(line)?;
    if &cap[3] == HltvInfo::AUTH_ID {
        return None;
    }
    Some(UserInfo {
        name: cap[1].to_owned(),
        user_id: cap[2].parse().ok()?,
        auth_id: cap[3].to_owned(),
        frags: cap[4].parse().ok()?,
        time: parse_duration(&cap[5])?,
        ping: cap[6].parse().ok()?,
        loss: cap[7].parse().ok()?,
        address: cap[8].to_owned(),
    })
}

fn parse_hltv(line: &str) -> Option<HltvInfo> {
    let re = regex!(r#"^#\s*\d+\s+"(.*)"\s+(\d+)\s+HLTV\s+hltv:(\d+)/(\d+)\s+delay:(\d+)\s+(\S+)$"#);
    let cap = re.captures(line)?;
    Some(HltvInfo {
        name: cap[1].to_owned(),
        user_id: cap[2].parse().ok()?,
        spectators: cap[3].parse().ok()?,
        slots: cap[4].parse().ok()?,
        delay: cap[5].parse().ok()?,
        address: cap[6].to_owned(),
    })
}

/// Parses the `mm:ss` or `hh:mm:ss` time-connected column.
fn parse_duration(s: &str) -> Option<Duration> {
    let mut seconds = 0u64;
    for part in s.split(':') {
        seconds = seconds * 60 + part.parse::<u64>().ok()?;
    }
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDSRC_STATUS: &str = "\
hostname:  Half-Life DM Server\n\
version :  48/1.1.2.2/Stdio 8684 secure  (10)\n\
tcp/ip  :  192.168.0.1:27015\n\
map     :  crossfire at: 0 x, 0 y, 0 z\n\
players :  2 active (16 max)\n\
\n\
#      name userid uniqueid frag time ping loss adr\n\
#  1 \"Joe\" 1 STEAM_0:1:23456 12 12:31 25 0 192.168.0.2:27005\n\
#  2 \"HLTV Proxy\" 2 HLTV hltv:1/128 delay:30 192.168.0.3:27020\n\
2 users\n";

    const SOURCE_STATUS: &str = "\
hostname: Team Fortress\n\
version : 1.0.6.1/15 3331 secure\n\
udp/ip  :  192.168.0.1:27015\n\
map     : ctf_2fort at: 0 x, 0 y, 0 z\n\
players : 2 (16 max)\n\
\n\
# userid name uniqueid connected ping loss state adr\n\
#  3 \"Ann\" 3 STEAM_0:0:99 7 1:02:03 43 0 192.168.0.4:27005\n";

    #[test]
    fn goldsrc() {
        let s = StatusInfo::parse_goldsrc(GOLDSRC_STATUS).unwrap();
        assert_eq!(s.hostname, "Half-Life DM Server");
        assert_eq!(s.version, "48/1.1.2.2/Stdio 8684 secure  (10)");
        assert_eq!(s.address, "192.168.0.1:27015");
        assert_eq!(s.map, "crossfire");
        assert_eq!(s.active_players, 2);
        assert_eq!(s.max_players, 16);
        assert_eq!(s.tail_user_count, Some(2));
        assert_eq!(s.users.len(), 2);
        match &s.users[0] {
            User::Normal(u) => {
                assert_eq!(u.name, "Joe");
                assert_eq!(u.user_id, 1);
                assert_eq!(u.auth_id, "STEAM_0:1:23456");
                assert_eq!(u.frags, 12);
                assert_eq!(u.time, Duration::from_secs(12 * 60 + 31));
                assert_eq!(u.ping, 25);
                assert_eq!(u.loss, 0);
                assert_eq!(u.address, "192.168.0.2:27005");
            }
            other => panic!("wrong user: {other:?}"),
        }
        match &s.users[1] {
            User::Hltv(h) => {
                assert_eq!(h.name, "HLTV Proxy");
                assert_eq!(h.spectators, 1);
                assert_eq!(h.slots, 128);
                assert_eq!(h.delay, 30);
            }
            other => panic!("wrong user: {other:?}"),
        }
        assert_eq!(s.raw, GOLDSRC_STATUS);
    }

    #[test]
    fn source() {
        let s = StatusInfo::parse_source(SOURCE_STATUS).unwrap();
        assert_eq!(s.hostname, "Team Fortress");
        assert_eq!(s.address, "192.168.0.1:27015");
        assert_eq!(s.map, "ctf_2fort");
        assert_eq!(s.active_players, 2);
        assert_eq!(s.max_players, 16);
        assert_eq!(s.tail_user_count, None);
        assert_eq!(s.users.len(), 1);
        match &s.users[0] {
            User::Normal(u) => {
                assert_eq!(u.name, "Ann");
                assert_eq!(u.time, Duration::from_secs(3723));
            }
            other => panic!("wrong user: {other:?}"),
        }
    }

    #[test]
    fn dialects_do_not_cross_parse() {
        assert!(matches!(
            StatusInfo::parse_source(GOLDSRC_STATUS),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            StatusInfo::parse_goldsrc(SOURCE_STATUS),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn header_rows_are_dropped() {
        let s = StatusInfo::parse_goldsrc(GOLDSRC_STATUS).unwrap();
        // the `#      name userid ...` banner matched neither row shape
        assert_eq!(s.users.len(), 2);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("05"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("12:31"), Some(Duration::from_secs(751)));
        assert_eq!(parse_duration("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_duration("abc"), None);
    }
}
