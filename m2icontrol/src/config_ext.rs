//! Extension pour construire les préférences du pont depuis m2iconfig
//!
//! Ce module fournit le trait `BridgeConfigExt` qui lit les sections `mpd`,
//! `irc`, `general` et `reconnect` de `m2iconfig::Config` et produit un
//! enregistrement [`Preferences`] validé.

use std::time::Duration;

use m2iconfig::{Config, Value};

use crate::errors::BridgeError;
use crate::mpd::ProtocolVersion;
use crate::preferences::{
    AuthMessage, ChatPreferences, ChatServer, DEFAULT_COMMAND_PREFIX, DEFAULT_IRC_PORT,
    DEFAULT_MPD_HOST, DEFAULT_MPD_PORT, DEFAULT_NICK, PlayerPreferences, Preferences,
    default_realname,
};
use crate::reconnect::{DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY, ReconnectPolicy};

/// Trait d'extension pour lire la configuration du pont
///
/// # Exemple
///
/// ```rust,ignore
/// use m2iconfig::Config;
/// use m2icontrol::BridgeConfigExt;
///
/// let config = Config::load_config(None)?;
/// let prefs = config.bridge_preferences()?;
/// ```
pub trait BridgeConfigExt {
    /// Construit et valide les préférences
    ///
    /// # Errors
    ///
    /// Retourne `BridgeError::Config` si une clé obligatoire manque, si une
    /// valeur est invalide ou si un mot de passe chiffré ne peut pas être lu.
    fn bridge_preferences(&self) -> Result<Preferences, BridgeError>;

    /// Section `mpd`
    fn player_preferences(&self) -> Result<PlayerPreferences, BridgeError>;

    /// Section `irc`
    fn chat_preferences(&self) -> Result<(ChatServer, ChatPreferences), BridgeError>;

    /// Section `reconnect`
    fn reconnect_policy(&self) -> ReconnectPolicy;
}

fn port(config: &Config, path: &[&str], default: u16) -> Result<u16, BridgeError> {
    let value = config.get_u64_or(path, default as u64);
    u16::try_from(value)
        .map_err(|_| BridgeError::config(format!("{} is not a valid port: {}", path.join("."), value)))
}

fn password(config: &Config, path: &[&str]) -> Result<Option<String>, BridgeError> {
    config
        .get_password(path)
        .map_err(|e| BridgeError::config(e.to_string()))
}

fn optional(config: &Config, path: &[&str]) -> Option<String> {
    let value = config.get_string_or(path, "");
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl BridgeConfigExt for Config {
    fn bridge_preferences(&self) -> Result<Preferences, BridgeError> {
        let player = self.player_preferences()?;
        let (server, chat) = self.chat_preferences()?;

        let prefs = Preferences {
            player,
            server,
            chat,
            die_password: password(self, &["general", "die_password"])?,
            announce: self.get_bool_or(&["general", "announce"], true),
            command_prefix: self.get_string_or(&["general", "command_prefix"], DEFAULT_COMMAND_PREFIX),
            reconnect: self.reconnect_policy(),
            connect_timeout: Duration::from_secs(
                self.get_u64_or(&["reconnect", "connect_timeout_secs"], 15),
            ),
        };
        prefs.validate()?;
        Ok(prefs)
    }

    fn player_preferences(&self) -> Result<PlayerPreferences, BridgeError> {
        // 0.20 non quoté devient le flottant 0.2
        let min_version = match self.get_value(&["mpd", "min_version"]) {
            Ok(Value::String(text)) => text,
            Ok(Value::Null) | Err(_) => "0.14".to_string(),
            Ok(_) => {
                return Err(BridgeError::config(
                    "mpd.min_version must be a quoted string, e.g. \"0.20\"",
                ));
            }
        };
        let min_version = min_version
            .parse::<ProtocolVersion>()
            .map_err(|e| BridgeError::config(format!("mpd.min_version: {}", e)))?;

        Ok(PlayerPreferences {
            host: self.get_string_or(&["mpd", "host"], DEFAULT_MPD_HOST),
            port: port(self, &["mpd", "port"], DEFAULT_MPD_PORT)?,
            password: password(self, &["mpd", "password"])?,
            min_version,
        })
    }

    fn chat_preferences(&self) -> Result<(ChatServer, ChatPreferences), BridgeError> {
        let server = ChatServer {
            host: self.get_string_or(&["irc", "host"], ""),
            port: port(self, &["irc", "port"], DEFAULT_IRC_PORT)?,
            tls: self.get_bool_or(&["irc", "tls"], false),
        };

        let auth = match (
            optional(self, &["irc", "auth", "service"]),
            password(self, &["irc", "auth", "message"])?,
        ) {
            (Some(service), Some(message)) => Some(AuthMessage { service, message }),
            _ => None,
        };

        let chat = ChatPreferences {
            nick: optional(self, &["irc", "nick"]).unwrap_or_else(|| DEFAULT_NICK.to_string()),
            username: optional(self, &["irc", "username"]).unwrap_or_else(|| DEFAULT_NICK.to_string()),
            realname: optional(self, &["irc", "realname"]).unwrap_or_else(default_realname),
            password: password(self, &["irc", "password"])?,
            channel: self.get_string_or(&["irc", "channel"], ""),
            auth,
            on_server_close: self.get_string_or(&["irc", "on_server_close"], "fatal").parse()?,
        };
        Ok((server, chat))
    }

    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_secs(
                self.get_u64_or(&["reconnect", "delay_secs"], DEFAULT_RECONNECT_DELAY.as_secs()),
            ),
            backoff: self.get_bool_or(&["reconnect", "backoff"], false),
            max_delay: Duration::from_secs(self.get_u64_or(
                &["reconnect", "max_delay_secs"],
                DEFAULT_MAX_RECONNECT_DELAY.as_secs(),
            )),
        }
    }
}
