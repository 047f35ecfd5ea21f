use thiserror::Error;

use crate::mpd::ProtocolVersion;

#[derive(Error, Debug)]
pub enum BridgeError {
    // Pannes de connectivité : on se reconnecte
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Cannot resolve {0}")]
    Resolve(String),
    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    // Conditions fatales
    #[error("MPD {found} is too old, at least {required} is required")]
    PlayerTooOld {
        found: ProtocolVersion,
        required: ProtocolVersion,
    },
    #[error("MPD error {code} on '{command}': {message}")]
    PlayerAck {
        code: u32,
        command: String,
        message: String,
    },
    #[error("MPD rejected the password: {0}")]
    PlayerAuth(String),
    #[error("Disconnected from IRC: {0}")]
    ChatClosed(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub fn tls(err: impl std::fmt::Display) -> Self {
        BridgeError::Tls(err.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        BridgeError::Config(msg.into())
    }

    /// Transient errors tear the link down and schedule a reconnect,
    /// everything else stops the bridge.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::Tls(_)
                | BridgeError::Resolve(_)
                | BridgeError::ConnectTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!BridgeError::from(io).is_fatal());
        assert!(!BridgeError::tls("bad certificate").is_fatal());
        assert!(!BridgeError::Resolve("nowhere:1".into()).is_fatal());
        assert!(!BridgeError::ConnectTimeout("mpd:6600".into()).is_fatal());
    }

    #[test]
    fn protocol_errors_are_fatal() {
        let too_old = BridgeError::PlayerTooOld {
            found: ProtocolVersion::new(0, 10),
            required: ProtocolVersion::new(0, 14),
        };
        assert!(too_old.is_fatal());
        assert_eq!(
            too_old.to_string(),
            "MPD 0.10 is too old, at least 0.14 is required"
        );
        assert!(BridgeError::ChatClosed("Closing Link".into()).is_fatal());
        assert!(BridgeError::PlayerAuth("incorrect password".into()).is_fatal());
        assert!(BridgeError::config("irc.host is empty").is_fatal());
    }
}
