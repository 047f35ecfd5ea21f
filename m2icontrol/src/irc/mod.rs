//! IRC client role: registration, join, keepalive and channel commands.

pub mod message;
pub mod session;

pub use message::IrcMessage;
pub use session::{ChatOutput, ChatSession, ChatState};
