//! Chat module
//!
//! The duplex connection to the conversational backend and the bridge that
//! serializes synchronous exchanges over it.

pub mod bridge;
pub mod channel;
pub mod protocol;
pub mod sanitize;

pub use bridge::{Bridge, BridgeError, BridgeStats};
pub use channel::{ChannelError, DuplexChannel, Peer};
pub use protocol::{ReplyFrame, Utterance};
pub use sanitize::strip_unsafe;
