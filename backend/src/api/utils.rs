//! API utility functions
//!
//! Shared router state plus helpers for credential extraction and request
//! validation.

use crate::error::AppError;
use crate::gateway::Gateway;
use axum::http::{header, HeaderMap};
use serde::Serialize;
use std::sync::Arc;

/// State shared by every handler
pub type RouterState = Arc<Gateway>;

/// Header the web client sends its token in
pub const TOKEN_HEADER: &str = "token";

/// Maximum utterance length in characters
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Plain `{status, error}` acknowledgement
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Whether the call succeeded
    pub status: bool,
    /// Failure message, if any
    pub error: Option<String>,
}

impl StatusResponse {
    /// Successful acknowledgement
    pub fn ok() -> Self {
        Self {
            status: true,
            error: None,
        }
    }
}

/// Extract the caller's credential
///
/// Accepts a `token` header or `Authorization: Bearer <token>`.
pub fn credential(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(token.to_string());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Validate an utterance text
///
/// # Returns
/// * `Ok(())` - Text is usable
/// * `Err(AppError::InvalidRequest)` - Text is blank or too long
pub fn validate_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::InvalidRequest("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(AppError::InvalidRequest(format!(
            "Text exceeds maximum length of {} characters",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_credential_from_token_header() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("abc"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(credential(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_credential_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(credential(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(credential(&headers), None);
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("hello").is_ok());
        assert!(validate_text("   ").is_err());
        assert!(validate_text(&"a".repeat(MAX_TEXT_LENGTH + 1)).is_err());
    }
}
