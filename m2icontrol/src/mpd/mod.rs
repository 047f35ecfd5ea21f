//! MPD client role: greeting check, status batches and idle subscription.

pub mod protocol;
pub mod session;

pub use protocol::ProtocolVersion;
pub use session::{PlayerOutput, PlayerSession, PlayerState};
