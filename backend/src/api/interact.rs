//! Conversation endpoints
//!
//! `/interact`, `/reset` and `/chat`.

use crate::api::utils::{credential, validate_text, RouterState, StatusResponse};
use crate::error::AppError;
use axum::{extract::State, http::HeaderMap, response::Json};
use serde::{Deserialize, Serialize};

/// Speaker id reported on every interact reply
pub const MODEL_ID: &str = "Model";

/// Request to send an utterance
#[derive(Debug, Deserialize)]
pub struct InteractRequest {
    /// Utterance text
    pub text: String,
}

/// Reply to an utterance
#[derive(Debug, Serialize)]
pub struct InteractResponse {
    /// Speaker id
    pub id: &'static str,
    /// Reply text
    pub text: String,
    /// Whether the episode ended
    pub episode_done: bool,
}

/// Stored history response
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Always true on success
    pub status: bool,
    /// Always null on success
    pub error: Option<String>,
    /// Alternating user/agent texts, oldest first
    pub history: Vec<String>,
}

/// POST /interact - Send an utterance and wait for the reply
pub async fn interact(
    State(gateway): State<RouterState>,
    headers: HeaderMap,
    Json(request): Json<InteractRequest>,
) -> Result<Json<InteractResponse>, AppError> {
    validate_text(&request.text)?;
    let reply = gateway
        .interact(credential(&headers).as_deref(), &request.text)
        .await?;

    Ok(Json(InteractResponse {
        id: MODEL_ID,
        text: reply.text,
        episode_done: reply.episode_done,
    }))
}

/// POST /reset - Reset the backend agent, then clear history
pub async fn reset(
    State(gateway): State<RouterState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    gateway.reset(credential(&headers).as_deref()).await?;
    Ok(Json(StatusResponse::ok()))
}

/// POST /chat - Fetch stored history
pub async fn chat_history(
    State(gateway): State<RouterState>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = gateway.history(credential(&headers).as_deref()).await?;
    Ok(Json(HistoryResponse {
        status: true,
        error: None,
        history,
    }))
}
