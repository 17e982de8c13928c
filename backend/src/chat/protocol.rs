//! Wire protocol shared by the gateway and the world server
//!
//! Frames are JSON text messages. Outbound frames carry an [`Utterance`],
//! inbound frames a [`ReplyFrame`]. No correlation identifier is carried:
//! ordering on the single connection is the only correlation mechanism.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Routing prompt the Overworld emits on entry
pub const ROUTING_PROMPT: &str = "type begin";
/// Quick replies offered with the routing prompt
pub const ROUTING_OPTIONS: [&str; 2] = ["begin", "exit"];
/// Re-prompt for unrecognized Overworld input
pub const INVALID_OPTION: &str = "Invalid option. Please type \"begin\".";
/// First TaskWorld turn
pub const GREETING: &str = "Hello and welcome to the Chatbot.";
/// Acknowledgement of a backend reset
pub const HISTORY_CLEARED: &str = "[History Cleared]";
/// Terminal sentinel: the episode ended and the connection is going away
pub const SESSION_ENDED: &str = "[DONE]";
/// Placeholder sent when the agent failed to produce a reply
pub const INTERNAL_ERROR: &str = "Sorry, Internal Server Error.";
/// Fallback the gateway answers with when the backend timed out
pub const APOLOGY: &str = "Sorry, I didn't get what you mean!";

/// Replies that are protocol chatter rather than conversation; never persisted.
static BOILERPLATE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        ROUTING_PROMPT,
        INVALID_OPTION,
        GREETING,
        HISTORY_CLEARED,
        SESSION_ENDED,
        INTERNAL_ERROR,
        APOLOGY,
    ]
    .into_iter()
    .collect()
});

/// Whether a reply belongs to the fixed set of system/boilerplate replies
pub fn is_boilerplate(reply: &str) -> bool {
    BOILERPLATE.contains(reply)
}

/// A text payload plus the chronological history attached for context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    /// Text the user typed (or a control token)
    pub text: String,
    /// Prior texts, oldest first; `None` keeps the agent's own context
    #[serde(default)]
    pub history: Option<Vec<String>>,
}

impl Utterance {
    /// Utterance with attached history
    pub fn with_history(text: impl Into<String>, history: Vec<String>) -> Self {
        Self {
            text: text.into(),
            history: Some(history),
        }
    }

    /// Utterance without history
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: None,
        }
    }
}

/// Reply frame sent by the world server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    /// Reply text
    pub text: String,
    /// Suggested quick replies, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
}

impl ReplyFrame {
    /// Plain reply without quick replies
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }
}
