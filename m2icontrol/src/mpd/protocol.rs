//! Lines of the MPD protocol, as far as the bridge needs them.

use std::fmt;
use std::str::FromStr;

use crate::model::{PlayState, PlayerStatus, TrackInfo};

pub const CMD_STATUS_BATCH: [&str; 4] = ["command_list_begin", "status", "currentsong", "command_list_end"];
pub const CMD_STATUS_ONLY: [&str; 1] = ["status"];
pub const CMD_IDLE: &str = "idle player options";
pub const CMD_NOIDLE: &str = "noidle";
pub const CMD_CLOSE: &str = "close";

/// `<major>.<minor>` of the protocol, the patch level is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::new(0, 14)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let mut number = |what: &str| -> Result<u32, String> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| format!("invalid {} version in '{}'", what, s))
        };
        let major = number("major")?;
        let minor = number("minor")?;
        Ok(Self::new(major, minor))
    }
}

/// `OK <name> <major>.<minor>.<patch>` → server name and version.
pub fn parse_greeting(line: &str) -> Option<(&str, ProtocolVersion)> {
    let rest = line.strip_prefix("OK ")?;
    let mut words = rest.split_whitespace();
    let name = words.next()?;
    let version = words.next()?.parse().ok()?;
    Some((name, version))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub code: u32,
    pub command: String,
    pub message: String,
}

/// `ACK [<code>@<index>] {<command>} <message>`
pub fn parse_ack(line: &str) -> Option<Ack> {
    let rest = line.strip_prefix("ACK ")?.trim_start();
    let (code, rest) = match rest.strip_prefix('[') {
        Some(inner) => {
            let (tag, rest) = inner.split_once(']')?;
            let code = tag.split('@').next()?.trim().parse().unwrap_or(0);
            (code, rest.trim_start())
        }
        None => (0, rest),
    };
    let (command, message) = match rest.strip_prefix('{') {
        Some(inner) => match inner.split_once('}') {
            Some((command, message)) => (command, message.trim()),
            None => ("", rest),
        },
        None => ("", rest),
    };
    Some(Ack {
        code,
        command: command.to_string(),
        message: message.to_string(),
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum Response<'a> {
    Ok,
    Ack(Ack),
    Field { key: &'a str, value: &'a str },
    Other,
}

impl<'a> Response<'a> {
    pub fn parse(line: &'a str) -> Self {
        if line == "OK" {
            return Response::Ok;
        }
        if let Some(ack) = parse_ack(line) {
            return Response::Ack(ack);
        }
        match line.split_once(": ") {
            Some((key, value)) if !key.is_empty() && !key.contains(' ') => Response::Field { key, value },
            _ => Response::Other,
        }
    }
}

/// Fields of a `status`/`currentsong` reply, collected until its `OK`.
#[derive(Debug, Default)]
pub struct ReplyBuffer {
    file: Option<String>,
    artist: Option<String>,
    title: Option<String>,
    album: Option<String>,
    repeat: bool,
    random: bool,
    crossfade: u32,
    state: PlayState,
}

impl ReplyBuffer {
    pub fn absorb(&mut self, key: &str, value: &str) {
        let slot = match key.to_ascii_lowercase().as_str() {
            "file" => &mut self.file,
            "artist" => &mut self.artist,
            "title" => &mut self.title,
            "album" => &mut self.album,
            "repeat" => {
                self.repeat = flag(value);
                return;
            }
            "random" => {
                self.random = flag(value);
                return;
            }
            "xfade" => {
                self.crossfade = value.trim().parse().unwrap_or(0);
                return;
            }
            "state" => {
                if let Some(state) = PlayState::parse(value) {
                    self.state = state;
                }
                return;
            }
            _ => return,
        };
        // Tags répétés : on garde la première valeur
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    pub fn track(&self) -> TrackInfo {
        TrackInfo {
            file: self.file.clone(),
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
        }
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            repeat: self.repeat,
            random: self.random,
            crossfade: self.crossfade,
            state: self.state,
        }
    }
}

fn flag(value: &str) -> bool {
    value.trim().parse::<i64>().map(|v| v != 0).unwrap_or(false)
}
