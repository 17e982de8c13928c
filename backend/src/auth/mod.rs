//! Authentication
//!
//! Password hashing for signup/login and signed, expiring bearer tokens
//! that identify a user on every chat request.

pub mod jwt;
pub mod password;

use thiserror::Error;

pub use jwt::{Claims, TokenIssuer};
pub use password::{hash_password, verify_password};

/// Errors raised while authenticating a request
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential was supplied
    #[error("Missing credential")]
    Missing,

    /// Credential is malformed or its signature does not verify
    #[error("Invalid credential")]
    Invalid,

    /// Credential was valid but its lifetime has passed
    #[error("Credential expired")]
    Expired,

    /// Email/password pair did not match a user
    #[error("No users found.")]
    BadLogin,

    /// Password hashing failed
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// Token could not be signed
    #[error("Token signing failed: {0}")]
    Signing(String),
}
