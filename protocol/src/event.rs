// SPDX-License-Identifier: LGPL-3.0-only

//! HL log standard line parsing.
//!
//! Servers push one log line per datagram, framed as
//! `L MM/dd/yyyy - HH:mm:ss: <payload>`. The payload is classified into
//! the event taxonomy below by trying a fixed sequence of patterns and
//! committing to the first that matches; a payload that matches a
//! pattern but carries an unknown inner verb is an error, not a fall
//! through.

use std::net::SocketAddr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::player::Player;
use crate::Error;

/// Property suffix of a log line: zero or more `(key "value")` clauses.
///
/// Keys keep the spelling of their last writer but compare
/// case-insensitively; a clause without a value, like `(muted)`, maps to
/// the literal string `true`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    /// Extracts every property clause found in `s`.
    pub fn parse(s: &str) -> Self {
        let mut props = Self::default();
        for cap in regex!(r#"\((\S+)(?: "([^"]*)")?\)"#).captures_iter(s) {
            let value = cap.get(2).map_or("true", |m| m.as_str());
            props.insert(&cap[1], value);
        }
        props
    }

    /// Inserts a property; a key already present (in any case) is
    /// overwritten.
    pub fn insert(&mut self, key: &str, value: &str) {
        let entry = (key.to_owned(), value.to_owned());
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no clause was present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates properties in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// One parsed log line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// The log line as received, without transport framing.
    pub raw: String,
    /// Timestamp from the line header.
    pub timestamp: NaiveDateTime,
    /// Trailing property clauses.
    pub properties: Properties,
    /// Classified payload.
    pub kind: EventKind,
}

impl Event {
    /// Event id from the HL log standard, e.g. `057` or `063a`.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Human-readable event name.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// The closed taxonomy of log events.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// `Server cvars start` (001a).
    CvarsStart,
    /// `Server cvar "k" = "v"` (001b).
    Cvar {
        /// Cvar name.
        key: String,
        /// Cvar value.
        value: String,
    },
    /// `Server cvars end` (001c).
    CvarsEnd,
    /// `Log file started` (002a).
    LogFileStarted,
    /// `Log file closed` (002b).
    LogFileClosed,
    /// `Loading map "m"` (003a).
    MapLoading {
        /// Map name.
        map: String,
    },
    /// `Started map "m"` (003b).
    MapStarted {
        /// Map name.
        map: String,
    },
    /// `Rcon: ...` / `Bad Rcon: ...` (004a/004b).
    Rcon {
        /// False for the `Bad Rcon` form.
        good: bool,
        /// Challenge nonce from the quoted command, if it parsed.
        challenge: Option<i64>,
        /// Password from the quoted command.
        password: String,
        /// The administrative command itself.
        command: String,
        /// Origin of the request, `None` when ip or port did not parse.
        sender: Option<SocketAddr>,
    },
    /// `Server name is "n"` (005).
    ServerName {
        /// Announced name.
        name: String,
    },
    /// `Server say "msg"` (006).
    ServerSay {
        /// Broadcast text.
        message: String,
    },
    /// `"P" connected, address "a"` (050).
    Connected {
        /// Connecting player.
        player: Player,
        /// Peer address as logged.
        address: String,
    },
    /// `"P" STEAM USERID validated` (050b).
    Validated {
        /// Validated player.
        player: Player,
    },
    /// `"P" entered the game` (051).
    EnteredGame {
        /// Entering player.
        player: Player,
    },
    /// `"P" disconnected` (052).
    Disconnected {
        /// Leaving player.
        player: Player,
    },
    /// `Kick: "P" was kicked by "admin"` (052b).
    Kicked {
        /// Kicked player.
        player: Player,
        /// Who issued the kick.
        kicker: String,
    },
    /// `"P" committed suicide with "w"` (053).
    Suicide {
        /// The player.
        player: Player,
        /// Means of death.
        weapon: String,
    },
    /// `"P" joined team "t"` (054).
    JoinedTeam {
        /// The player.
        player: Player,
        /// New team.
        team: String,
    },
    /// `"P" changed role to "r"` (055).
    ChangedRole {
        /// The player.
        player: Player,
        /// New role.
        role: String,
    },
    /// `"P" changed name to "n"` (056).
    ChangedName {
        /// The player.
        player: Player,
        /// New nickname.
        name: String,
    },
    /// `"A" killed "V" with "w"` (057).
    Kill {
        /// The killer.
        attacker: Player,
        /// The victim.
        victim: Player,
        /// Weapon name.
        weapon: String,
    },
    /// `"A" attacked "V" with "w"` (058).
    Attack {
        /// The attacker.
        attacker: Player,
        /// The victim.
        victim: Player,
        /// Weapon name.
        weapon: String,
    },
    /// `"A" triggered "action" against "V"` (059).
    PlayerOnPlayer {
        /// Acting player.
        source: Player,
        /// Affected player.
        target: Player,
        /// Action name.
        action: String,
    },
    /// `"P" triggered "action"` (060).
    PlayerAction {
        /// Acting player.
        player: Player,
        /// Action name.
        action: String,
    },
    /// `Team "T" triggered "action"` (061).
    TeamAction {
        /// Acting team.
        team: String,
        /// Action name.
        action: String,
    },
    /// `World triggered "action"` (062).
    WorldAction {
        /// Action name.
        action: String,
    },
    /// `"P" say "msg"` (063a).
    Say {
        /// Speaking player.
        player: Player,
        /// Chat text.
        message: String,
    },
    /// `"P" say_team "msg"` (063b).
    SayTeam {
        /// Speaking player.
        player: Player,
        /// Chat text.
        message: String,
    },
    /// `Team "T" formed alliance with team "U"` (064).
    Alliance {
        /// Initiating team.
        team: String,
        /// Allied team.
        ally: String,
    },
    /// `Team "T" scored "s" with "n" players` (065).
    TeamScore {
        /// Scoring team.
        team: String,
        /// Score value.
        score: i32,
        /// Player count backing the score.
        players: i32,
    },
    /// `"A" tell "B" message "msg"` (066).
    PrivateChat {
        /// Sender.
        from: Player,
        /// Recipient.
        to: Player,
        /// Chat text.
        message: String,
    },
    /// `Player "P" scored "s"` (067).
    PlayerScore {
        /// Scoring player.
        player: Player,
        /// Score value.
        score: i32,
    },
    /// `"P" selected weapon "w"` (068).
    SelectedWeapon {
        /// The player.
        player: Player,
        /// Weapon name.
        weapon: String,
    },
    /// `"P" acquired the "w"` (069).
    AcquiredWeapon {
        /// The player.
        player: Player,
        /// Weapon name.
        weapon: String,
    },
}

impl EventKind {
    /// Event id from the HL log standard.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CvarsStart => "001a",
            Self::Cvar { .. } => "001b",
            Self::CvarsEnd => "001c",
            Self::LogFileStarted => "002a",
            Self::LogFileClosed => "002b",
            Self::MapLoading { .. } => "003a",
            Self::MapStarted { .. } => "003b",
            Self::Rcon { good: true, .. } => "004a",
            Self::Rcon { good: false, .. } => "004b",
            Self::ServerName { .. } => "005",
            Self::ServerSay { .. } => "006",
            Self::Connected { .. } => "050",
            Self::Validated { .. } => "050b",
            Self::EnteredGame { .. } => "051",
            Self::Disconnected { .. } => "052",
            Self::Kicked { .. } => "052b",
            Self::Suicide { .. } => "053",
            Self::JoinedTeam { .. } => "054",
            Self::ChangedRole { .. } => "055",
            Self::ChangedName { .. } => "056",
            Self::Kill { .. } => "057",
            Self::Attack { .. } => "058",
            Self::PlayerOnPlayer { .. } => "059",
            Self::PlayerAction { .. } => "060",
            Self::TeamAction { .. } => "061",
            Self::WorldAction { .. } => "062",
            Self::Say { .. } => "063a",
            Self::SayTeam { .. } => "063b",
            Self::Alliance { .. } => "064",
            Self::TeamScore { .. } => "065",
            Self::PrivateChat { .. } => "066",
            Self::PlayerScore { .. } => "067",
            Self::SelectedWeapon { .. } => "068",
            Self::AcquiredWeapon { .. } => "069",
        }
    }

    /// Human-readable event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CvarsStart => "Cvars Start",
            Self::Cvar { .. } => "Server Cvar",
            Self::CvarsEnd => "Cvars End",
            Self::LogFileStarted => "Log File Started",
            Self::LogFileClosed => "Log File Closed",
            Self::MapLoading { .. } => "Map Loading",
            Self::MapStarted { .. } => "Map Started",
            Self::Rcon { good: true, .. } => "Rcon",
            Self::Rcon { good: false, .. } => "Bad Rcon",
            Self::ServerName { .. } => "Server Name",
            Self::ServerSay { .. } => "Server Say",
            Self::Connected { .. } => "Connection",
            Self::Validated { .. } => "Validation",
            Self::EnteredGame { .. } => "Enter Game",
            Self::Disconnected { .. } => "Disconnection",
            Self::Kicked { .. } => "Kick",
            Self::Suicide { .. } => "Suicide",
            Self::JoinedTeam { .. } => "Team Selection",
            Self::ChangedRole { .. } => "Role Selection",
            Self::ChangedName { .. } => "Name Change",
            Self::Kill { .. } => "Kill",
            Self::Attack { .. } => "Attack",
            Self::PlayerOnPlayer { .. } => "Player Action Against Player",
            Self::PlayerAction { .. } => "Player Action",
            Self::TeamAction { .. } => "Team Action",
            Self::WorldAction { .. } => "World Action",
            Self::Say { .. } => "Chat",
            Self::SayTeam { .. } => "Team Chat",
            Self::Alliance { .. } => "Team Alliance",
            Self::TeamScore { .. } => "Team Score Report",
            Self::PrivateChat { .. } => "Private Chat",
            Self::PlayerScore { .. } => "Player Score Report",
            Self::SelectedWeapon { .. } => "Weapon Selection",
            Self::AcquiredWeapon { .. } => "Weapon Pickup",
        }
    }
}

/// Parses one received log line.
///
/// Returns `Ok(None)` when the input does not carry a log line at all —
/// no `L date - time:` frame, an invalid calendar date, or a `//`
/// comment payload — and `Err(Error::UnknownEvent)` when the frame
/// matched but the payload fits no pattern. Transport noise before the
/// frame (the `0xFFFFFFFF` datagram header) is ignored.
pub fn parse(line: &str) -> Result<Option<Event>, Error> {
    let re = regex!(r"L (\d{2}/\d{2}/\d{4}) - (\d{2}:\d{2}:\d{2}): (.*)");
    let Some(cap) = re.captures(line) else {
        return Ok(None);
    };
    let Ok(date) = NaiveDate::parse_from_str(&cap[1], "%m/%d/%Y") else {
        return Ok(None);
    };
    let Ok(time) = NaiveTime::parse_from_str(&cap[2], "%H:%M:%S") else {
        return Ok(None);
    };
    let payload = cap[3].trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    if payload.starts_with("//") {
        return Ok(None);
    }

    match classify(payload) {
        Some((kind, properties)) => Ok(Some(Event {
            raw: cap[0].trim_end().to_owned(),
            timestamp: NaiveDateTime::new(date, time),
            properties,
            kind,
        })),
        None => Err(Error::UnknownEvent(payload.to_owned())),
    }
}

/// Tries the event patterns in priority order and commits to the first
/// whose shape matches; `None` means the committed pattern had an
/// unknown verb or nothing matched at all.
fn classify(payload: &str) -> Option<(EventKind, Properties)> {
    // 1. Server cvar "k" = "v"
    if let Some(cap) = regex!(r#"^Server cvar "([^"]*)" = "([^"]*)"(.*)$"#).captures(payload) {
        let kind = EventKind::Cvar {
            key: cap[1].to_owned(),
            value: cap[2].to_owned(),
        };
        return Some((kind, Properties::parse(&cap[3])));
    }

    // 2. Rcon: "cmd" from "ip:port" / Bad Rcon: ...
    if let Some(cap) = regex!(r#"^(Bad )?Rcon: "(.*)" from "([^"]*)"(.*)$"#).captures(payload) {
        let good = cap.get(1).is_none();
        let (challenge, password, command) =
            match regex!(r#"^rcon (-?\d+) "(.*)" (.*)$"#).captures(&cap[2]) {
                Some(inner) => (
                    inner[1].parse().ok(),
                    inner[2].to_owned(),
                    inner[3].to_owned(),
                ),
                None => (None, String::new(), cap[2].to_owned()),
            };
        let kind = EventKind::Rcon {
            good,
            challenge,
            password,
            command,
            sender: cap[3].parse().ok(),
        };
        return Some((kind, Properties::parse(&cap[4])));
    }

    // 3. Kick: "P" was kicked by "admin"
    if let Some(cap) =
        regex!(r#"^Kick: "([^"]*)" was kicked by "([^"]*)"(.*)$"#).captures(payload)
    {
        let kind = EventKind::Kicked {
            player: Player::parse_lossy(&cap[1]),
            kicker: cap[2].to_owned(),
        };
        return Some((kind, Properties::parse(&cap[3])));
    }

    // 4. Team "T" scored "s" with "n" players
    if let Some(cap) =
        regex!(r#"^Team "([^"]*)" scored "(-?\d+)" with "(-?\d+)" players(.*)$"#).captures(payload)
    {
        let kind = EventKind::TeamScore {
            team: cap[1].to_owned(),
            score: cap[2].parse().unwrap_or(0),
            players: cap[3].parse().unwrap_or(0),
        };
        return Some((kind, Properties::parse(&cap[4])));
    }

    // 5. Player "P" scored "s"
    if let Some(cap) = regex!(r#"^Player "([^"]*)" scored "(-?\d+)"(.*)$"#).captures(payload) {
        let kind = EventKind::PlayerScore {
            player: Player::parse_lossy(&cap[1]),
            score: cap[2].parse().unwrap_or(0),
        };
        return Some((kind, Properties::parse(&cap[3])));
    }

    // 6. "A" verb "B" verb "C" — two players and a noun, whose order
    // depends on the verb: the second quoted group is tried as a player
    // first, otherwise it is the noun and the player sits in the last
    // group ("A" triggered "thing" against "B").
    if let Some(cap) =
        regex!(r#"^"([^"]*)" (\S+) "([^"]*)" ([^"]+) "([^"]*)"(.*)$"#).captures(payload)
    {
        let props = Properties::parse(&cap[6]);
        let first = Player::parse_lossy(&cap[1]);
        let (second, noun) = match Player::parse(&cap[3]) {
            Some(p) => (p, cap[5].to_owned()),
            None => (Player::parse_lossy(&cap[5]), cap[3].to_owned()),
        };
        let kind = match &cap[2] {
            "killed" => EventKind::Kill {
                attacker: first,
                victim: second,
                weapon: noun,
            },
            "attacked" => EventKind::Attack {
                attacker: first,
                victim: second,
                weapon: noun,
            },
            "triggered" => EventKind::PlayerOnPlayer {
                source: first,
                target: second,
                action: noun,
            },
            "tell" => EventKind::PrivateChat {
                from: first,
                to: second,
                message: noun,
            },
            _ => return None,
        };
        return Some((kind, props));
    }

    // 7. "P" verb "noun" — the verb never contains a paren, which keeps
    // property suffixes of noun-less lines out of this pattern
    if let Some(cap) = regex!(r#"^"([^"]*)" ([^"(]+?) "([^"]*)"(.*)$"#).captures(payload) {
        let player = Player::parse_lossy(&cap[1]);
        let noun = cap[3].to_owned();
        let kind = match &cap[2] {
            "connected, address" => EventKind::Connected {
                player,
                address: noun,
            },
            "committed suicide with" => EventKind::Suicide {
                player,
                weapon: noun,
            },
            "joined team" => EventKind::JoinedTeam { player, team: noun },
            "changed role to" => EventKind::ChangedRole { player, role: noun },
            "changed name to" => EventKind::ChangedName { player, name: noun },
            "triggered" => EventKind::PlayerAction {
                player,
                action: noun,
            },
            "say" => EventKind::Say {
                player,
                message: noun,
            },
            "say_team" => EventKind::SayTeam {
                player,
                message: noun,
            },
            "selected weapon" => EventKind::SelectedWeapon {
                player,
                weapon: noun,
            },
            "acquired the" => EventKind::AcquiredWeapon {
                player,
                weapon: noun,
            },
            _ => return None,
        };
        return Some((kind, Properties::parse(&cap[4])));
    }

    // 8. "P" text — no quoted noun
    if let Some(cap) = regex!(r#"^"([^"]*)" ([^"]+?)( \(.*)?$"#).captures(payload) {
        let player = Player::parse_lossy(&cap[1]);
        let props = Properties::parse(cap.get(3).map_or("", |m| m.as_str()));
        let kind = match cap[2].trim_end() {
            "STEAM USERID validated" => EventKind::Validated { player },
            "entered the game" => EventKind::EnteredGame { player },
            "disconnected" => EventKind::Disconnected { player },
            _ => return None,
        };
        return Some((kind, props));
    }

    // 9. Team "T" verb "noun"
    if let Some(cap) = regex!(r#"^Team "([^"]*)" ([^"]+?) "([^"]*)"(.*)$"#).captures(payload) {
        let team = cap[1].to_owned();
        let noun = cap[3].to_owned();
        let kind = match &cap[2] {
            "triggered" => EventKind::TeamAction { team, action: noun },
            "formed alliance with team" => EventKind::Alliance { team, ally: noun },
            _ => return None,
        };
        return Some((kind, Properties::parse(&cap[4])));
    }

    // 10. verb-phrase "noun"
    if let Some(cap) = regex!(r#"^([^"(]+?) "([^"]*)"(.*)$"#).captures(payload) {
        let noun = cap[2].to_owned();
        let kind = match cap[1].trim_end() {
            "World triggered" => EventKind::WorldAction { action: noun },
            "Loading map" => EventKind::MapLoading { map: noun },
            "Started map" => EventKind::MapStarted { map: noun },
            "Server name is" => EventKind::ServerName { name: noun },
            "Server say" => EventKind::ServerSay { message: noun },
            _ => return None,
        };
        return Some((kind, Properties::parse(&cap[3])));
    }

    // 11. bare verb-phrase
    if let Some(cap) = regex!(r#"^([^"(]+?)( \(.*)?$"#).captures(payload) {
        let props = Properties::parse(cap.get(2).map_or("", |m| m.as_str()));
        let kind = match cap[1].trim_end() {
            "Server cvars start" => EventKind::CvarsStart,
            "Server cvars end" => EventKind::CvarsEnd,
            "Log file started" => EventKind::LogFileStarted,
            "Log file closed" => EventKind::LogFileClosed,
            _ => return None,
        };
        return Some((kind, props));
    }

    None
}
