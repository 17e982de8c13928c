//! World server WebSocket endpoint
//!
//! Each connection to `/websocket` gets its own [`WorldSession`]. Frames are
//! handled strictly in arrival order; replies are written in the same order.

use crate::world::agent::AgentFactory;
use crate::world::session::WorldSession;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state of the world server
#[derive(Clone)]
pub struct WorldServerState {
    /// Creates one agent per TaskWorld
    pub factory: Arc<dyn AgentFactory>,
}

/// Router exposing the backend WebSocket
pub fn router(state: WorldServerState) -> Router {
    Router::new()
        .route("/websocket", get(websocket_handler))
        .with_state(state)
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<WorldServerState>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state.factory))
}

async fn handle_socket(socket: WebSocket, factory: Arc<dyn AgentFactory>) {
    let (mut sender, mut receiver) = socket.split();
    info!("Gateway connected");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    // Forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sender.send(msg).await {
                error!("Failed to send frame: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        let mut session = WorldSession::new(factory);
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(raw)) => {
                    let output = session.handle_frame(&raw).await;
                    if let Some(reply) = output.reply {
                        match serde_json::to_string(&reply) {
                            Ok(json) => {
                                if tx.send(Message::Text(json)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to encode reply: {}", e),
                        }
                    }
                    if output.episode_done {
                        info!("Episode finished, closing connection");
                        let _ = tx.send(Message::Close(None));
                        break;
                    }
                }
                Ok(Message::Ping(payload)) => {
                    if tx.send(Message::Pong(payload)).is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    info!("Gateway disconnected");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    // Wait for either side to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            // The frame queue is closed now; let the final reply flush.
            let _ = (&mut send_task).await;
        }
    }

    info!("World connection closed");
}
