//! Session store
//!
//! Maps a user identifier to the ordered history of exchanged utterances.
//! Mutations for one identity are serialized; different identities never
//! contend with each other.

pub mod db;
pub mod error;
pub mod locks;
pub mod models;

use async_trait::async_trait;

pub use db::UserDb;
pub use error::StoreError;
pub use locks::KeyedLocks;
pub use models::UserRecord;

/// Per-user conversation history storage
///
/// History is chronological, oldest first. Only the gateway mutates it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stored history for `user_id`; empty when there is none
    async fn load(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    /// Append `entries` to the end of the history
    async fn append(&self, user_id: &str, entries: &[String]) -> Result<(), StoreError>;

    /// Remove the whole history
    async fn clear(&self, user_id: &str) -> Result<(), StoreError>;
}
