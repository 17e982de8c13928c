//! Two-phase conversation world
//!
//! A connection starts in the Overworld, which routes the user into exactly
//! one TaskWorld. The TaskWorld drives an [`Agent`] until a control token
//! ends the episode. [`step`] is the whole transition function; it knows
//! nothing about sockets.

use crate::chat::protocol::{
    ReplyFrame, Utterance, GREETING, HISTORY_CLEARED, INTERNAL_ERROR, INVALID_OPTION,
    ROUTING_OPTIONS, ROUTING_PROMPT, SESSION_ENDED,
};
use crate::world::agent::{Agent, AgentFactory};
use crate::world::control::ControlToken;
use tracing::{debug, info, warn};

/// Owns a TaskWorld's agent and guarantees its shutdown hook runs once
pub struct AgentHandle {
    agent: Option<Box<dyn Agent>>,
}

impl AgentHandle {
    /// Wrap a freshly created agent
    pub fn new(agent: Box<dyn Agent>) -> Self {
        Self { agent: Some(agent) }
    }

    fn agent_mut(&mut self) -> Option<&mut (dyn Agent + 'static)> {
        self.agent.as_deref_mut()
    }

    /// Run the agent's shutdown hook; later calls do nothing
    pub fn shutdown(&mut self) {
        if let Some(mut agent) = self.agent.take() {
            agent.shutdown();
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Per-connection world state
pub enum WorldState {
    /// Routing phase; `prompted` once the routing prompt went out
    Overworld {
        /// Whether the entry prompt has been emitted
        prompted: bool,
    },
    /// Chat phase with its agent
    TaskWorld(AgentHandle),
    /// Episode over; the connection is about to close
    Finished,
}

impl Default for WorldState {
    fn default() -> Self {
        WorldState::Overworld { prompted: false }
    }
}

impl WorldState {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            WorldState::Overworld { .. } => "overworld",
            WorldState::TaskWorld(_) => "task_world",
            WorldState::Finished => "finished",
        }
    }
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Output {
    /// Reply to send back, if any
    pub reply: Option<ReplyFrame>,
    /// Whether the episode ended with this turn
    pub episode_done: bool,
}

impl Output {
    fn reply(frame: ReplyFrame) -> Self {
        Self {
            reply: Some(frame),
            episode_done: false,
        }
    }

    fn silent() -> Self {
        Self::default()
    }

    fn ended() -> Self {
        Self {
            reply: Some(ReplyFrame::text(SESSION_ENDED)),
            episode_done: true,
        }
    }
}

/// Collapse newlines and double spaces the way replies are displayed
pub fn normalize(text: &str) -> String {
    text.replace('\n', " ")
        .replace(".  ", ", ")
        .replace("  ", ", ")
}

type ControlHandler = fn(&mut AgentHandle) -> Output;

/// Token → handler dispatch for TaskWorld control tokens
const CONTROL_HANDLERS: [(ControlToken, ControlHandler); 3] = [
    (ControlToken::Done, on_done),
    (ControlToken::Reset, on_reset),
    (ControlToken::FetchAll, on_fetch_all),
];

fn on_done(handle: &mut AgentHandle) -> Output {
    handle.shutdown();
    Output::ended()
}

fn on_reset(handle: &mut AgentHandle) -> Output {
    if let Some(agent) = handle.agent_mut() {
        agent.reset();
    }
    Output::reply(ReplyFrame::text(HISTORY_CLEARED))
}

fn on_fetch_all(_handle: &mut AgentHandle) -> Output {
    Output::silent()
}

fn dispatch(token: ControlToken, handle: &mut AgentHandle) -> Output {
    CONTROL_HANDLERS
        .iter()
        .find(|(t, _)| *t == token)
        .map_or_else(Output::silent, |(_, handler)| handler(handle))
}

/// Advance the world by one utterance
///
/// # Arguments
/// * `state` - Current state, consumed
/// * `utterance` - Incoming user utterance with optional history
/// * `factory` - Creates the agent when the user enters the TaskWorld
///
/// # Returns
/// * `(WorldState, Output)` - next state and what to send back
pub async fn step(
    state: WorldState,
    utterance: Utterance,
    factory: &dyn AgentFactory,
) -> (WorldState, Output) {
    match state {
        WorldState::Overworld { prompted: false } => {
            debug!("Entering overworld, sending routing prompt");
            let frame = ReplyFrame {
                text: ROUTING_PROMPT.to_string(),
                quick_replies: ROUTING_OPTIONS.iter().map(|s| s.to_string()).collect(),
            };
            (WorldState::Overworld { prompted: true }, Output::reply(frame))
        }
        WorldState::Overworld { prompted: true } => route(utterance.text.trim(), factory),
        WorldState::TaskWorld(handle) => task_turn(handle, utterance).await,
        WorldState::Finished => {
            let output = Output {
                reply: None,
                episode_done: true,
            };
            (WorldState::Finished, output)
        }
    }
}

fn route(choice: &str, factory: &dyn AgentFactory) -> (WorldState, Output) {
    if choice.eq_ignore_ascii_case("exit") {
        info!("User exited from the overworld");
        (WorldState::Finished, Output::ended())
    } else if choice.eq_ignore_ascii_case("begin") {
        info!("User entered the task world");
        let handle = AgentHandle::new(factory.create());
        (
            WorldState::TaskWorld(handle),
            Output::reply(ReplyFrame::text(GREETING)),
        )
    } else {
        let frame = ReplyFrame {
            text: INVALID_OPTION.to_string(),
            quick_replies: vec![ROUTING_OPTIONS[0].to_string()],
        };
        (WorldState::Overworld { prompted: true }, Output::reply(frame))
    }
}

async fn task_turn(mut handle: AgentHandle, utterance: Utterance) -> (WorldState, Output) {
    let text = normalize(&utterance.text);

    if let Some(token) = ControlToken::detect(&text) {
        debug!(token = token.literal(), "Control token");
        let output = dispatch(token, &mut handle);
        if output.episode_done {
            return (WorldState::Finished, output);
        }
        return (WorldState::TaskWorld(handle), output);
    }

    let Some(agent) = handle.agent_mut() else {
        return (WorldState::Finished, Output::ended());
    };
    if let Some(history) = utterance.history.as_deref() {
        agent.replace_history(history);
    }
    agent.observe(&text);

    let output = match agent.act().await {
        Ok(Some(reply)) => Output::reply(ReplyFrame::text(normalize(&reply))),
        Ok(None) => Output::silent(),
        Err(e) => {
            warn!("Agent failed to act: {}", e);
            Output::reply(ReplyFrame::text(INTERNAL_ERROR))
        }
    };
    (WorldState::TaskWorld(handle), output)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::world::agent::AgentError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Observations and calls recorded by [`ScriptedAgent`]
    #[derive(Default)]
    pub(crate) struct Journal {
        pub observed: Mutex<Vec<String>>,
        pub histories: Mutex<Vec<Vec<String>>>,
        pub resets: AtomicUsize,
        pub shutdowns: AtomicUsize,
    }

    /// Agent that answers `reply:<text>` and records everything it sees
    pub(crate) struct ScriptedAgent {
        journal: Arc<Journal>,
        last: Option<String>,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn observe(&mut self, text: &str) {
            self.journal.observed.lock().unwrap().push(text.to_string());
            self.last = Some(text.to_string());
        }

        async fn act(&mut self) -> Result<Option<String>, AgentError> {
            match self.last.take().as_deref() {
                Some("silence") => Ok(None),
                Some("explode") => Err(AgentError::EmptyResponse),
                Some(text) => Ok(Some(format!("reply:{}", text))),
                None => Ok(None),
            }
        }

        fn reset(&mut self) {
            self.journal.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn replace_history(&mut self, history: &[String]) {
            self.journal.histories.lock().unwrap().push(history.to_vec());
        }

        fn shutdown(&mut self) {
            self.journal.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn scripted_factory(journal: Arc<Journal>) -> impl AgentFactory {
        move || {
            Box::new(ScriptedAgent {
                journal: journal.clone(),
                last: None,
            }) as Box<dyn Agent>
        }
    }

    async fn into_task_world(factory: &dyn AgentFactory) -> WorldState {
        let (state, _) = step(WorldState::default(), Utterance::bare(""), factory).await;
        let (state, out) = step(state, Utterance::bare("BEGIN"), factory).await;
        assert_eq!(out.reply.unwrap().text, GREETING);
        state
    }

    fn reply_text(out: &Output) -> Option<&str> {
        out.reply.as_ref().map(|r| r.text.as_str())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a\nb"), "a b");
        assert_eq!(normalize("One.  Two"), "One, Two");
        assert_eq!(normalize("x  y"), "x, y");
        assert_eq!(normalize("plain text"), "plain text");
    }

    #[tokio::test]
    async fn test_overworld_routing() {
        let journal = Arc::new(Journal::default());
        let factory = scripted_factory(journal.clone());

        let (state, out) = step(WorldState::default(), Utterance::bare("anything"), &factory).await;
        let prompt = out.reply.unwrap();
        assert_eq!(prompt.text, ROUTING_PROMPT);
        assert_eq!(prompt.quick_replies, vec!["begin", "exit"]);
        assert!(!out.episode_done);

        let (state, out) = step(state, Utterance::bare("hello"), &factory).await;
        assert_eq!(reply_text(&out), Some(INVALID_OPTION));
        assert!(matches!(state, WorldState::Overworld { prompted: true }));

        let (state, out) = step(state, Utterance::bare("Exit"), &factory).await;
        assert_eq!(reply_text(&out), Some(SESSION_ENDED));
        assert!(out.episode_done);
        assert!(matches!(state, WorldState::Finished));
        // No agent was ever created.
        assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_turn_replays_history_then_observes() {
        let journal = Arc::new(Journal::default());
        let factory = scripted_factory(journal.clone());
        let state = into_task_world(&factory).await;

        let history = vec!["hi".to_string(), "hello".to_string()];
        let (state, out) = step(
            state,
            Utterance::with_history("how are  you", history.clone()),
            &factory,
        )
        .await;
        assert_eq!(reply_text(&out), Some("reply:how are, you"));
        assert_eq!(*journal.histories.lock().unwrap(), vec![history]);

        // Absent history keeps the agent's own context.
        let (_state, out) = step(state, Utterance::bare("again"), &factory).await;
        assert_eq!(reply_text(&out), Some("reply:again"));
        assert_eq!(journal.histories.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_control_tokens() {
        let journal = Arc::new(Journal::default());
        let factory = scripted_factory(journal.clone());
        let state = into_task_world(&factory).await;

        let (state, out) = step(state, Utterance::bare("[RESET]"), &factory).await;
        assert_eq!(reply_text(&out), Some(HISTORY_CLEARED));
        assert_eq!(journal.resets.load(Ordering::SeqCst), 1);

        let (state, out) = step(state, Utterance::bare("[FETCH_ALL_DATA]"), &factory).await;
        assert_eq!(out, Output::silent());

        // Neither token reached the agent.
        assert!(journal.observed.lock().unwrap().is_empty());

        let (state, out) = step(state, Utterance::bare("[DONE] [RESET]"), &factory).await;
        assert_eq!(reply_text(&out), Some(SESSION_ENDED));
        assert!(out.episode_done);
        assert_eq!(journal.resets.load(Ordering::SeqCst), 1);
        assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 1);

        drop(state);
        assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_control_tokens_survive_normalization() {
        let journal = Arc::new(Journal::default());
        let factory = scripted_factory(journal.clone());
        let state = into_task_world(&factory).await;

        let (state, out) = step(state, Utterance::bare("[RESET]  please"), &factory).await;
        assert_eq!(reply_text(&out), Some(HISTORY_CLEARED));
        assert_eq!(journal.resets.load(Ordering::SeqCst), 1);

        let (state, out) = step(state, Utterance::bare("I'm [DONE]."), &factory).await;
        assert_eq!(reply_text(&out), Some(SESSION_ENDED));
        assert!(out.episode_done);
        assert!(matches!(state, WorldState::Finished));
        assert!(journal.observed.lock().unwrap().is_empty());

        let state = into_task_world(&factory).await;
        let (_state, out) = step(state, Utterance::bare("[DONE]  "), &factory).await;
        assert!(out.episode_done);
    }

    #[tokio::test]
    async fn test_silent_and_failing_agent() {
        let journal = Arc::new(Journal::default());
        let factory = scripted_factory(journal.clone());
        let state = into_task_world(&factory).await;

        let (state, out) = step(state, Utterance::bare("silence"), &factory).await;
        assert_eq!(out, Output::silent());

        let (state, out) = step(state, Utterance::bare("explode"), &factory).await;
        assert_eq!(reply_text(&out), Some(INTERNAL_ERROR));
        assert!(!out.episode_done);
        assert!(matches!(state, WorldState::TaskWorld(_)));
    }

    #[tokio::test]
    async fn test_dropping_task_world_shuts_agent_down() {
        let journal = Arc::new(Journal::default());
        let factory = scripted_factory(journal.clone());
        let state = into_task_world(&factory).await;
        drop(state);
        assert_eq!(journal.shutdowns.load(Ordering::SeqCst), 1);
    }
}
