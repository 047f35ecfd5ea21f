use crate::errors::BridgeError;
use crate::model::{LinkId, PlayerStatus, TrackInfo};

/// What an I/O task reports to the bridge about its connection.
#[derive(Debug)]
pub enum LinkEventKind {
    Connected,
    Line(String),
    /// The connection is gone. `None` is a clean end of stream.
    Closed(Option<BridgeError>),
}

#[derive(Debug)]
pub struct LinkEvent {
    pub link: LinkId,
    pub kind: LinkEventKind,
}

impl LinkEvent {
    pub fn new(link: LinkId, kind: LinkEventKind) -> Self {
        Self { link, kind }
    }
}

/// Raised by the player session once a reply is fully committed.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    Ready,
    TrackChanged(TrackInfo),
    StatusChanged(PlayerStatus),
}

/// Raised by the chat session.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    Joined,
    /// Text of a channel command, prefix removed.
    Command { sender: String, text: String },
    /// Privileged shutdown with a matching password.
    Die { sender: String },
    /// `ERROR` from the server while configured to reconnect.
    ServerClosed(String),
}
