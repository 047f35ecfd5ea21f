//! Bridge between an MPD server and an IRC channel.
//!
//! MPD track changes are announced on the channel, and channel commands
//! (`!next`, `!pause`, `!np`...) drive MPD.

mod events;

pub mod bridge;
pub mod codec;
pub mod config_ext;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod irc;
pub mod line_channel;
pub mod model;
pub mod mpd;
pub mod preferences;
pub mod reconnect;
pub mod transport;

pub use bridge::{Bridge, ShutdownHandle};
pub use config_ext::BridgeConfigExt;
pub use dispatcher::ChatCommand;
pub use errors::BridgeError;
pub use events::{ChatEvent, LinkEvent, LinkEventKind, PlayerEvent};
pub use gateway::{Effect, Gateway};
pub use model::{LinkId, LinkState, PlayState, PlayerStatus, Remote, TrackInfo};
pub use mpd::ProtocolVersion;
pub use preferences::{ChatPreferences, ChatServer, PlayerPreferences, Preferences, ServerClosePolicy};
pub use reconnect::{ReconnectPolicy, ReconnectScheduler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
