//! Immutable settings of a bridge, built once at startup.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::errors::BridgeError;
use crate::mpd::ProtocolVersion;
use crate::reconnect::ReconnectPolicy;
use crate::transport::Endpoint;

pub const DEFAULT_MPD_HOST: &str = "localhost";
pub const DEFAULT_MPD_PORT: u16 = 6600;
pub const DEFAULT_IRC_PORT: u16 = 6667;
pub const DEFAULT_NICK: &str = "mpd2irc";
pub const DEFAULT_COMMAND_PREFIX: &str = "!";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const WEAK_DIE_PASSWORD: &str = "secret";

/// What to do when the IRC server sends `ERROR`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServerClosePolicy {
    #[default]
    Fatal,
    Reconnect,
}

impl FromStr for ServerClosePolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" => Ok(ServerClosePolicy::Fatal),
            "reconnect" => Ok(ServerClosePolicy::Reconnect),
            other => Err(BridgeError::config(format!(
                "irc.on_server_close must be 'fatal' or 'reconnect', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerPreferences {
    /// Host name, or the path of a Unix socket when it starts with `/`.
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub min_version: ProtocolVersion,
}

impl Default for PlayerPreferences {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPD_HOST.to_string(),
            port: DEFAULT_MPD_PORT,
            password: None,
            min_version: ProtocolVersion::default(),
        }
    }
}

impl PlayerPreferences {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::player(&self.host, self.port)
    }
}

/// Message sent to an identification service right after registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthMessage {
    pub service: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPreferences {
    pub nick: String,
    pub username: String,
    pub realname: String,
    pub password: Option<String>,
    pub channel: String,
    pub auth: Option<AuthMessage>,
    pub on_server_close: ServerClosePolicy,
}

impl Default for ChatPreferences {
    fn default() -> Self {
        Self {
            nick: DEFAULT_NICK.to_string(),
            username: DEFAULT_NICK.to_string(),
            realname: default_realname(),
            password: None,
            channel: String::new(),
            auth: None,
            on_server_close: ServerClosePolicy::default(),
        }
    }
}

pub fn default_realname() -> String {
    format!("mpd2irc {}", crate::VERSION)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatServer {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Default for ChatServer {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_IRC_PORT,
            tls: false,
        }
    }
}

impl ChatServer {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::chat(&self.host, self.port, self.tls)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    pub player: PlayerPreferences,
    pub server: ChatServer,
    pub chat: ChatPreferences,
    /// `None` disables the privileged `die` command.
    pub die_password: Option<String>,
    pub announce: bool,
    pub command_prefix: String,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            player: PlayerPreferences::default(),
            server: ChatServer::default(),
            chat: ChatPreferences::default(),
            die_password: None,
            announce: true,
            command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Preferences {
    /// Refuses settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.server.host.trim().is_empty() {
            return Err(BridgeError::config("irc.host is not set"));
        }
        if self.chat.channel.trim().is_empty() {
            return Err(BridgeError::config("irc.channel is not set"));
        }
        if self.chat.nick.trim().is_empty() {
            return Err(BridgeError::config("irc.nick is empty"));
        }
        if self.server.port == 0 {
            return Err(BridgeError::config("irc.port must not be 0"));
        }
        if self.player.port == 0 && !self.player.host.starts_with('/') {
            return Err(BridgeError::config("mpd.port must not be 0"));
        }
        if self.command_prefix.is_empty() {
            return Err(BridgeError::config("general.command_prefix is empty"));
        }
        if self.reconnect.delay.is_zero() {
            return Err(BridgeError::config("reconnect.delay_secs must not be 0"));
        }
        Ok(())
    }

    /// Non fatal remarks about the settings, logged at startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match self.die_password.as_deref() {
            None => warnings.push("general.die_password is empty, the die command is disabled".to_string()),
            Some(WEAK_DIE_PASSWORD) => warnings.push("Weak die password".to_string()),
            Some(_) => {}
        }
        if self.server.tls && self.server.port == DEFAULT_IRC_PORT {
            warnings.push(format!(
                "irc.tls is enabled on port {}, which is usually plain text",
                DEFAULT_IRC_PORT
            ));
        }
        warnings
    }

    pub fn log_warnings(&self) {
        for warning in self.warnings() {
            warn!("⚠️ {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Preferences {
        let mut prefs = Preferences::default();
        prefs.server.host = "irc.example.org".into();
        prefs.chat.channel = "#music".into();
        prefs.die_password = Some("letmeout".into());
        prefs
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let prefs = Preferences::default();
        assert_eq!(prefs.player.endpoint().to_string(), "localhost:6600");
        assert_eq!(prefs.server.port, 6667);
        assert_eq!(prefs.chat.nick, "mpd2irc");
        assert!(prefs.chat.realname.starts_with("mpd2irc "));
        assert!(prefs.announce);
        assert_eq!(prefs.reconnect.delay, Duration::from_secs(30));
        assert!(!prefs.reconnect.backoff);
        assert_eq!(prefs.connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn required_keys_are_checked() {
        assert!(valid().validate().is_ok());

        let err = Preferences::default().validate().unwrap_err();
        assert!(err.to_string().contains("irc.host"));

        let mut prefs = valid();
        prefs.chat.channel = " ".into();
        assert!(prefs.validate().unwrap_err().to_string().contains("irc.channel"));

        let mut prefs = valid();
        prefs.server.port = 0;
        assert!(prefs.validate().is_err());

        // Un socket Unix n'a pas de port
        let mut prefs = valid();
        prefs.player.host = "/run/mpd/socket".into();
        prefs.player.port = 0;
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn weak_or_missing_die_password_is_reported() {
        assert!(valid().warnings().is_empty());

        let mut prefs = valid();
        prefs.die_password = None;
        assert_eq!(prefs.warnings().len(), 1);

        prefs.die_password = Some("secret".into());
        assert_eq!(prefs.warnings(), vec!["Weak die password".to_string()]);
    }

    #[test]
    fn server_close_policy_parsing() {
        assert_eq!("fatal".parse::<ServerClosePolicy>().unwrap(), ServerClosePolicy::Fatal);
        assert_eq!("Reconnect".parse::<ServerClosePolicy>().unwrap(), ServerClosePolicy::Reconnect);
        assert!("maybe".parse::<ServerClosePolicy>().is_err());
    }
}
