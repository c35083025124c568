// SPDX-License-Identifier: LGPL-3.0-only

//! Player identity as it appears in log lines.

use std::fmt;

use serde::Serialize;

/// One player mentioned by a log line.
///
/// The canonical textual form is `nick<uid><authid><team>`; the nick may
/// contain any character except a double quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Player {
    /// Player nickname.
    pub nick: String,
    /// Server user id, `-1` when it could not be parsed.
    pub uid: i32,
    /// Steam auth id, or `HLTV` for the spectator proxy.
    pub auth_id: String,
    /// Team name.
    pub team: String,
}

impl Player {
    /// Parses the canonical form; `None` when `s` does not match.
    pub fn parse(s: &str) -> Option<Self> {
        let cap = regex!(r"^(.*)<([^<>]*)><([^<>]*)><([^<>]*)>$").captures(s)?;
        Some(Self {
            nick: cap[1].to_owned(),
            uid: cap[2].parse().unwrap_or(-1),
            auth_id: cap[3].to_owned(),
            team: cap[4].to_owned(),
        })
    }

    /// As [`parse`](Self::parse), but a mismatch yields the empty
    /// sentinel with uid `-1` instead of `None`. Event patterns use this
    /// where the grammar tolerates unparsable players.
    pub fn parse_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }
}

impl Default for Player {
    fn default() -> Self {
        Self {
            nick: String::new(),
            uid: -1,
            auth_id: String::new(),
            team: String::new(),
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}<{}><{}><{}>",
            self.nick, self.uid, self.auth_id, self.team
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let p = Player::parse("Joe<15><STEAM_0:1:23456><Blue>").unwrap();
        assert_eq!(p.nick, "Joe");
        assert_eq!(p.uid, 15);
        assert_eq!(p.auth_id, "STEAM_0:1:23456");
        assert_eq!(p.team, "Blue");
    }

    #[test]
    fn round_trip() {
        for s in [
            "Joe<15><STEAM_0:1:23456><Blue>",
            "<0><><>",
            "a b c<42><BOT><>",
            "nick with <brackets><7><STEAM_0:0:1><Red>",
        ] {
            let p = Player::parse(s).unwrap();
            assert_eq!(Player::parse(&p.to_string()), Some(p));
        }
    }

    #[test]
    fn bad_uid_becomes_sentinel() {
        let p = Player::parse("Joe<abc><STEAM_0:1:2><Red>").unwrap();
        assert_eq!(p.uid, -1);
    }

    #[test]
    fn mismatch() {
        assert_eq!(Player::parse("not a player"), None);
        assert_eq!(Player::parse_lossy("not a player"), Player::default());
        assert_eq!(Player::parse_lossy("junk").uid, -1);
    }
}
