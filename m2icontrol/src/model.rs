use std::fmt;

/// The two remotes the bridge keeps a connection to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Remote {
    Player,
    Chat,
}

impl Remote {
    pub const ALL: [Remote; 2] = [Remote::Player, Remote::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Remote::Player => "mpd",
            Remote::Chat => "irc",
        }
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one connection attempt to a remote.
///
/// The generation grows on every reconnect, so events coming from a
/// connection that has since been replaced can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkId {
    pub remote: Remote,
    pub generation: u64,
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.remote, self.generation)
    }
}

/// Lifecycle of a connection, common to both remotes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlayState {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "play" => Some(PlayState::Playing),
            "pause" => Some(PlayState::Paused),
            "stop" => Some(PlayState::Stopped),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayState::Playing => "play",
            PlayState::Paused => "pause",
            PlayState::Stopped => "stop",
        }
    }
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub repeat: bool,
    pub random: bool,
    pub crossfade: u32,
    pub state: PlayState,
}

impl PlayerStatus {
    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repeat: {}, Random: {}, Crossfade: {} sec, State: {}",
            on_off(self.repeat),
            on_off(self.random),
            self.crossfade,
            self.state
        )
    }
}

/// Metadata of the current song. Two values describe the same track when
/// their file identifiers are equal, whatever the tags say.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackInfo {
    pub file: Option<String>,
    pub artist: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
}

impl TrackInfo {
    /// File identifier, empty when nothing is loaded.
    pub fn file_id(&self) -> &str {
        self.file.as_deref().unwrap_or("")
    }

    pub fn same_track(&self, other: &TrackInfo) -> bool {
        self.file_id() == other.file_id()
    }

    /// `Artist - Title (Album)` with fallbacks for missing tags.
    pub fn describe(&self) -> String {
        let artist = non_empty(&self.artist).unwrap_or("Unknown artist");
        let title = non_empty(&self.title).unwrap_or(self.file_id());
        match non_empty(&self.album) {
            Some(album) => format!("{} - {} ({})", artist, title, album),
            None => format!("{} - {}", artist, title),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(file: &str, artist: Option<&str>, title: Option<&str>, album: Option<&str>) -> TrackInfo {
        TrackInfo {
            file: Some(file.to_string()),
            artist: artist.map(String::from),
            title: title.map(String::from),
            album: album.map(String::from),
        }
    }

    #[test]
    fn describe_uses_all_tags() {
        let t = track("a.mp3", Some("X"), Some("Y"), Some("Z"));
        assert_eq!(t.describe(), "X - Y (Z)");
    }

    #[test]
    fn describe_falls_back_for_missing_tags() {
        let t = track("music/a.mp3", None, None, None);
        assert_eq!(t.describe(), "Unknown artist - music/a.mp3");

        let t = track("a.mp3", Some("X"), Some(""), None);
        assert_eq!(t.describe(), "X - a.mp3");
    }

    #[test]
    fn identity_is_the_file_only() {
        let a = track("a.mp3", Some("X"), Some("Y"), None);
        let b = track("a.mp3", Some("Other"), None, None);
        assert!(a.same_track(&b));
        assert!(!a.same_track(&TrackInfo::default()));
        assert_eq!(TrackInfo::default().file_id(), "");
    }

    #[test]
    fn status_formatting() {
        let status = PlayerStatus {
            repeat: true,
            random: false,
            crossfade: 0,
            state: PlayState::Playing,
        };
        assert_eq!(
            status.to_string(),
            "Repeat: on, Random: off, Crossfade: 0 sec, State: play"
        );
        assert!(status.is_playing());
        assert_eq!(PlayerStatus::default().state, PlayState::Stopped);
    }

    #[test]
    fn play_state_parsing() {
        assert_eq!(PlayState::parse("pause"), Some(PlayState::Paused));
        assert_eq!(PlayState::parse("stop"), Some(PlayState::Stopped));
        assert_eq!(PlayState::parse("dancing"), None);
    }
}
