//! Account endpoints
//!
//! `/signup`, `/login` and `/logout`.

use crate::api::utils::{RouterState, StatusResponse};
use crate::auth::AuthError;
use crate::error::AppError;
use crate::gateway::NewAccount;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

/// Signup request; fields beyond email and password become the profile
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    /// Login email
    pub email: String,
    /// Plaintext password
    pub password: String,
    /// Any other fields
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email
    pub email: String,
    /// Plaintext password
    pub password: String,
}

/// Login result
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Whether the credentials matched
    pub status: bool,
    /// Failure message
    pub error: Option<String>,
    /// Echoed email on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Bearer token on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// POST /signup - Register an account
pub async fn signup(
    State(gateway): State<RouterState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    gateway
        .signup(NewAccount {
            email: request.email,
            password: request.password,
            profile: request.profile,
        })
        .await?;
    Ok(Json(StatusResponse::ok()))
}

/// POST /login - Exchange email and password for a token
///
/// A mismatch is reported as `status: false` with HTTP 200.
pub async fn login(
    State(gateway): State<RouterState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = match gateway.login(&request.email, &request.password).await? {
        Some(token) => LoginResponse {
            status: true,
            error: None,
            email: Some(request.email),
            token: Some(token),
        },
        None => LoginResponse {
            status: false,
            error: Some(AuthError::BadLogin.to_string()),
            email: None,
            token: None,
        },
    };
    Ok(Json(response))
}

/// POST /logout - Stateless acknowledgement; tokens simply expire
pub async fn logout() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}
