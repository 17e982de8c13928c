//! World session
//!
//! One backend connection runs one [`WorldSession`]: raw text frames go in,
//! reply frames come out, and the session reports when the episode is over.

use crate::chat::channel::{ChannelFrame, Peer};
use crate::chat::protocol::Utterance;
use crate::world::agent::AgentFactory;
use crate::world::state::{step, Output, WorldState};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Conversation state of one backend connection
pub struct WorldSession {
    state: WorldState,
    factory: Arc<dyn AgentFactory>,
}

impl WorldSession {
    /// Start a session in the Overworld
    pub fn new(factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            state: WorldState::default(),
            factory,
        }
    }

    /// Feed one inbound text frame
    ///
    /// Frames that are not an utterance object are taken as bare text.
    pub async fn handle_frame(&mut self, raw: &str) -> Output {
        let utterance = serde_json::from_str::<Utterance>(raw).unwrap_or_else(|e| {
            warn!("Frame is not an utterance ({}), treating it as plain text", e);
            Utterance::bare(raw)
        });

        let state = std::mem::replace(&mut self.state, WorldState::Finished);
        let (next, output) = step(state, utterance, self.factory.as_ref()).await;
        debug!(state = next.name(), has_reply = output.reply.is_some(), "World step");
        self.state = next;
        output
    }

    /// Whether the episode has ended
    pub fn is_finished(&self) -> bool {
        matches!(self.state, WorldState::Finished)
    }
}

/// Serve a session on the backend end of an in-memory channel
///
/// Runs until the gateway closes the channel or the episode ends; in the
/// latter case the peer's reply sender is dropped, which the gateway sees as
/// the connection going away.
pub fn spawn_on_peer(peer: Peer, factory: Arc<dyn AgentFactory>) -> JoinHandle<()> {
    let Peer {
        mut incoming,
        outgoing,
    } = peer;

    tokio::spawn(async move {
        let mut session = WorldSession::new(factory);
        while let Some(frame) = incoming.recv().await {
            let raw = match frame {
                ChannelFrame::Text(raw) => raw,
                ChannelFrame::Close => break,
            };
            let output = session.handle_frame(&raw).await;
            if let Some(reply) = output.reply {
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if outgoing.send(json).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to encode reply: {}", e),
                }
            }
            if output.episode_done {
                info!("Episode finished, closing session");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::protocol::{ReplyFrame, GREETING, ROUTING_PROMPT, SESSION_ENDED};
    use crate::world::state::tests::{scripted_factory, Journal};
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn utterance(text: &str) -> ChannelFrame {
        ChannelFrame::Text(serde_json::to_string(&Utterance::bare(text)).unwrap())
    }

    async fn next_reply(rx: &mut mpsc::UnboundedReceiver<String>) -> ReplyFrame {
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_text_frame_is_accepted() {
        let journal = Arc::new(Journal::default());
        let mut session = WorldSession::new(Arc::new(scripted_factory(journal)));
        let out = session.handle_frame("not json").await;
        assert_eq!(out.reply.unwrap().text, ROUTING_PROMPT);
    }

    #[tokio::test]
    async fn test_peer_session_runs_to_completion() {
        let journal = Arc::new(Journal::default());
        let (to_world, incoming) = mpsc::unbounded_channel();
        let (outgoing, mut from_world) = mpsc::unbounded_channel();
        let handle = spawn_on_peer(
            Peer { incoming, outgoing },
            Arc::new(scripted_factory(journal.clone())),
        );

        to_world.send(utterance("")).unwrap();
        assert_eq!(next_reply(&mut from_world).await.text, ROUTING_PROMPT);
        to_world.send(utterance("begin")).unwrap();
        assert_eq!(next_reply(&mut from_world).await.text, GREETING);
        to_world.send(utterance("hello")).unwrap();
        assert_eq!(next_reply(&mut from_world).await.text, "reply:hello");
        to_world.send(utterance("[DONE]")).unwrap();
        assert_eq!(next_reply(&mut from_world).await.text, SESSION_ENDED);

        handle.await.unwrap();
        // Reply sender dropped with the session.
        assert!(from_world.recv().await.is_none());
        assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 1);
    }
}
