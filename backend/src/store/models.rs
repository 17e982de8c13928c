//! User data models

use crate::store::StoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered user with their stored conversation history
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    /// Stable user identifier (UUID v4)
    pub id: String,
    /// Login email, unique
    pub email: String,
    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Extra signup fields as a JSON object
    pub profile: String,
    /// JSON array of alternating user/agent texts, oldest first
    pub history: String,
    /// When the user signed up (Unix timestamp)
    pub created_at: i64,
}

impl UserRecord {
    /// Create a new user with empty history
    pub fn new(
        id: String,
        email: String,
        password_hash: String,
        profile: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            email,
            password_hash,
            profile: serde_json::Value::Object(profile).to_string(),
            history: "[]".to_string(),
            created_at: Utc::now().timestamp(),
        }
    }
}

/// Decode a history column value
pub(crate) fn decode_history(raw: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(format!("history: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_user_has_empty_history() {
        let mut profile = serde_json::Map::new();
        profile.insert("username".to_string(), json!("evv"));
        let user = UserRecord::new(
            "u1".to_string(),
            "a@b.c".to_string(),
            "hash".to_string(),
            profile,
        );
        assert!(decode_history(&user.history).unwrap().is_empty());
        assert_eq!(user.profile, r#"{"username":"evv"}"#);
        assert!(!serde_json::to_string(&user).unwrap().contains("hash"));
    }

    #[test]
    fn test_corrupt_history_is_reported() {
        assert!(matches!(
            decode_history("{not an array"),
            Err(StoreError::Corrupt(_))
        ));
    }
}
