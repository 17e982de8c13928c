//! API module
//!
//! HTTP handlers for the conversational gateway and the router that mounts
//! them.

pub mod account;
pub mod interact;
pub mod utils;

use crate::api::utils::RouterState;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};

/// Build the gateway router (without middleware layers)
pub fn router(state: RouterState) -> Router {
    Router::new()
        .route("/", get(hello_world))
        .route("/api/health", get(health_check))
        .route("/interact", post(interact::interact))
        .route("/reset", post(interact::reset))
        .route("/chat", post(interact::chat_history))
        .route("/signup", post(account::signup))
        .route("/login", post(account::login))
        .route("/logout", post(account::logout))
        .with_state(state)
}

/// GET / - Liveness text
pub async fn hello_world() -> &'static str {
    "Chat bridge gateway is running"
}

/// GET /api/health - Health check with bridge instrumentation
pub async fn health_check(State(gateway): State<RouterState>) -> Json<serde_json::Value> {
    let health = gateway.health();
    Json(serde_json::json!({
        "status": if health.channel_closed { "closing" } else { "ok" },
        "service": "chat-bridge",
        "bridge": health.bridge,
        "channel_closed": health.channel_closed,
        "primed": health.primed,
    }))
}
