//! Chat commands and what they turn into.

use crate::model::{PlayerStatus, TrackInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatCommand {
    Next,
    Prev,
    Pause,
    Play,
    Stop,
    Random,
    Repeat,
    Status,
    NowPlaying,
    Version,
    Announce,
}

/// Name and shortest accepted abbreviation of each command.
const COMMANDS: [(&str, usize, ChatCommand); 11] = [
    ("next", 4, ChatCommand::Next),
    ("prev", 4, ChatCommand::Prev),
    ("pause", 5, ChatCommand::Pause),
    ("play", 4, ChatCommand::Play),
    ("stop", 4, ChatCommand::Stop),
    ("random", 4, ChatCommand::Random),
    ("repeat", 3, ChatCommand::Repeat),
    ("status", 4, ChatCommand::Status),
    ("np", 2, ChatCommand::NowPlaying),
    ("version", 3, ChatCommand::Version),
    ("announce", 3, ChatCommand::Announce),
];

impl ChatCommand {
    /// Matches the first word of `text`, case-insensitively.
    ///
    /// The word must be a prefix of a command name at least as long as that
    /// command's minimum abbreviation: `ann` is `announce`, `an` is nothing,
    /// and neither is `randomXYZ`.
    pub fn parse(text: &str) -> Option<Self> {
        let keyword = text.split_whitespace().next()?.to_ascii_lowercase();
        COMMANDS
            .iter()
            .find(|(name, min, _)| keyword.len() >= *min && name.starts_with(keyword.as_str()))
            .map(|(_, _, command)| *command)
    }

    pub fn name(&self) -> &'static str {
        COMMANDS
            .iter()
            .find(|(_, _, command)| command == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("?")
    }
}

/// Outcome of a command: a line for MPD and/or a reply for the channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub player: Option<String>,
    pub reply: Option<String>,
}

impl Dispatch {
    fn player(line: &str) -> Self {
        Self {
            player: Some(line.to_string()),
            reply: None,
        }
    }

    fn reply(text: String) -> Self {
        Self {
            player: None,
            reply: Some(text),
        }
    }
}

/// Reply of the `version` command.
pub fn version_string() -> String {
    format!("This is mpd2irc {}", crate::VERSION)
}

fn toggle(option: &str, enabled: bool) -> Dispatch {
    Dispatch {
        player: Some(format!("{} {}", option, u8::from(!enabled))),
        reply: Some(format!(
            "{} {}",
            if enabled { "Disabled" } else { "Enabled" },
            option
        )),
    }
}

/// Maps a command to its effect, reading only committed state.
///
/// `announce` is the only state a command can change here.
pub fn dispatch(
    command: ChatCommand,
    status: &PlayerStatus,
    track: &TrackInfo,
    announce: &mut bool,
) -> Dispatch {
    match command {
        ChatCommand::Next => Dispatch::player("next"),
        ChatCommand::Prev => Dispatch::player("previous"),
        ChatCommand::Pause if status.is_playing() => Dispatch::player("pause 1"),
        ChatCommand::Pause => Dispatch::player("play"),
        ChatCommand::Play => Dispatch::player("play"),
        ChatCommand::Stop => Dispatch::player("stop"),
        ChatCommand::Random => toggle("random", status.random),
        ChatCommand::Repeat => toggle("repeat", status.repeat),
        ChatCommand::Status => Dispatch::reply(status.to_string()),
        ChatCommand::NowPlaying => {
            if track.file_id().is_empty() {
                Dispatch::reply("Now Playing: nothing".to_string())
            } else {
                Dispatch::reply(format!("Now Playing: {}", track.describe()))
            }
        }
        ChatCommand::Version => Dispatch::reply(version_string()),
        ChatCommand::Announce => {
            *announce = !*announce;
            Dispatch::reply(format!(
                "Announcements {}abled.",
                if *announce { "en" } else { "dis" }
            ))
        }
    }
}
