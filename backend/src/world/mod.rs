//! Conversational backend
//!
//! The world server side of the bridge: an Overworld/TaskWorld state
//! machine per connection, driving a pluggable [`Agent`].

pub mod agent;
pub mod control;
pub mod gemini;
pub mod gemini_types;
pub mod server;
pub mod session;
pub mod state;

pub use agent::{Agent, AgentError, AgentFactory, EchoAgent};
pub use control::ControlToken;
pub use gemini::{GeminiAgent, GeminiSettings};
pub use session::{spawn_on_peer, WorldSession};
pub use state::{normalize, step, Output, WorldState};
