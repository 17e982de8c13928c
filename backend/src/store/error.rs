//! Session store error types

use thiserror::Error;

/// Errors raised by the session store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be reached or the query failed
    #[error("Database error: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// No user record with this identifier
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// A user with this email already exists
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// Database directory could not be created
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
