//! Error types and error handling for the gateway
//!
//! This module defines the application error that HTTP handlers return.
//! Every module error converts into [`AppError`], and `AppError` implements
//! `IntoResponse` so handlers can simply use `?`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::chat::BridgeError;
use crate::store::StoreError;

/// Application-level error types
///
/// Each variant maps onto one failure class of the request surface.
#[derive(Error, Debug)]
pub enum AppError {
    /// Credential missing, malformed, expired, or pointing at no user
    #[error("Authentication failed: {0}")]
    AuthInvalid(String),

    /// Session store call failed; the caller may retry
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// No reply from the conversational backend within the bound
    #[error("Backend did not reply within {0} seconds")]
    BridgeTimeout(u64),

    /// Backend connection is gone; the process is shutting down
    #[error("Conversational backend connection closed")]
    ChannelClosed,

    /// Request body failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Signup with an email that is already registered
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownUser(id) => AppError::AuthInvalid(format!("unknown user {}", id)),
            StoreError::DuplicateEmail(email) => AppError::DuplicateEmail(email),
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(bound) => AppError::BridgeTimeout(bound.as_secs()),
            BridgeError::ChannelClosed => AppError::ChannelClosed,
            BridgeError::Encode(e) => AppError::Internal(anyhow::anyhow!(e)),
            BridgeError::Aborted(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            e @ (AuthError::PasswordHash(_) | AuthError::Signing(_)) => {
                AppError::Internal(anyhow::anyhow!(e))
            }
            other => AppError::AuthInvalid(other.to_string()),
        }
    }
}

impl AppError {
    /// HTTP status code this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BridgeTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateEmail(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %self, "Request failed");
        }

        let body = Json(json!({
            "status": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_retryable_or_auth() {
        let unknown: AppError = StoreError::UnknownUser("u1".to_string()).into();
        assert!(matches!(unknown, AppError::AuthInvalid(_)));

        let corrupt: AppError = StoreError::Corrupt("bad json".to_string()).into();
        assert!(matches!(corrupt, AppError::StoreUnavailable(_)));
        assert_eq!(corrupt.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_bridge_errors_map_to_statuses() {
        let timeout: AppError = BridgeError::Timeout(std::time::Duration::from_secs(5)).into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let closed: AppError = BridgeError::ChannelClosed.into();
        assert_eq!(closed.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_auth_error_is_unauthorized() {
        let err: AppError = AuthError::Expired.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
