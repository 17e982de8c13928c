//! Agent interface
//!
//! The conversational model behind a TaskWorld. The world feeds it one
//! observation per turn and asks it to act; everything else about the model
//! is opaque.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Errors an agent can raise while acting
#[derive(Error, Debug)]
pub enum AgentError {
    /// The model endpoint could not be reached or answered with an error
    #[error("Model request failed: {0}")]
    Request(String),

    /// The model refused the prompt
    #[error("Model blocked the prompt: {0}")]
    Blocked(String),

    /// The model answered without usable text
    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// A conversational model instance, owned by exactly one TaskWorld
#[async_trait]
pub trait Agent: Send {
    /// Record the user's next utterance
    fn observe(&mut self, text: &str);

    /// Produce a reply to everything observed so far
    ///
    /// `Ok(None)` means the agent has nothing to say this turn.
    async fn act(&mut self) -> Result<Option<String>, AgentError>;

    /// Forget the working context
    fn reset(&mut self);

    /// Replace the working context with `history` (oldest first, alternating
    /// user and agent texts)
    fn replace_history(&mut self, history: &[String]);

    /// Release resources; called once when the episode ends
    fn shutdown(&mut self) {}
}

/// Creates one agent per TaskWorld
pub trait AgentFactory: Send + Sync {
    /// Instantiate a fresh agent
    fn create(&self) -> Box<dyn Agent>;
}

impl<F> AgentFactory for F
where
    F: Fn() -> Box<dyn Agent> + Send + Sync,
{
    fn create(&self) -> Box<dyn Agent> {
        self()
    }
}

/// Local development agent that repeats the last utterance
#[derive(Debug, Default)]
pub struct EchoAgent {
    context: Vec<String>,
    pending: Option<String>,
}

impl EchoAgent {
    /// Create an echo agent with empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of texts in the working context
    pub fn context_len(&self) -> usize {
        self.context.len()
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn observe(&mut self, text: &str) {
        self.pending = Some(text.to_string());
    }

    async fn act(&mut self) -> Result<Option<String>, AgentError> {
        let Some(text) = self.pending.take() else {
            return Ok(None);
        };
        let reply = format!("You said: {}", text);
        self.context.push(text);
        self.context.push(reply.clone());
        Ok(Some(reply))
    }

    fn reset(&mut self) {
        self.context.clear();
        self.pending = None;
    }

    fn replace_history(&mut self, history: &[String]) {
        self.context = history.to_vec();
    }

    fn shutdown(&mut self) {
        debug!(turns = self.context.len() / 2, "Echo agent shut down");
    }
}
