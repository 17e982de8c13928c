//! User database operations
//!
//! SQLite-backed user records and the [`SessionStore`] implementation the
//! gateway persists conversation history through.

use crate::store::locks::KeyedLocks;
use crate::store::models::{decode_history, UserRecord};
use crate::store::{SessionStore, StoreError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Database connection pool for users and history
pub struct UserDb {
    pool: SqlitePool,
    /// Serializes history mutations per user
    locks: KeyedLocks,
}

impl UserDb {
    /// Initialize database connection pool
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    ///
    /// # Returns
    /// * `Ok(UserDb)` if successful
    /// * `Err(StoreError)` if connection or migration failed
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        // Ensure parent directory exists
        if let Some(parent) = PathBuf::from(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // SQLite connection string format: sqlite://path/to/db.db
        let connection_string = if db_path.starts_with("sqlite:") {
            db_path.to_string()
        } else {
            format!("sqlite:{}", db_path)
        };

        // WAL lets readers proceed during a write; writers queue on the busy timeout.
        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        info!("Connected to SQLite database at: {}", db_path);

        let db = Self {
            pool,
            locks: KeyedLocks::new(),
        };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations...");

        let migration_sql = include_str!("../../migrations/001_create_users.sql");

        // Remove comments (lines starting with --) and normalize whitespace
        let mut cleaned_sql = String::new();
        for line in migration_sql.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            // Remove inline comments (everything after --)
            let without_comments = match trimmed.find("--") {
                Some(pos) => &trimmed[..pos],
                None => trimmed,
            };
            cleaned_sql.push_str(without_comments.trim());
            cleaned_sql.push(' ');
        }

        for statement in cleaned_sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Insert a new user
    ///
    /// # Returns
    /// * `Err(StoreError::DuplicateEmail)` if the email is taken
    pub async fn create_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, profile, history, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.profile)
        .bind(&user.history)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(user_id = %user.id, "Created user");
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateEmail(user.email.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password_hash, profile, history, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Look up a user by identifier
    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password_hash, profile, history, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl SessionStore for UserDb {
    async fn load(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT history FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((raw,)) => decode_history(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn append(&self, user_id: &str, entries: &[String]) -> Result<(), StoreError> {
        // The per-user lock makes read-modify-write safe without a transaction.
        let _guard = self.locks.lock(user_id).await;

        let row: Option<(String,)> = sqlx::query_as("SELECT history FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((raw,)) = row else {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        };

        let mut history = decode_history(&raw)?;
        history.extend(entries.iter().cloned());
        let encoded = serde_json::to_string(&history)
            .map_err(|e| StoreError::Corrupt(format!("history: {}", e)))?;

        sqlx::query("UPDATE users SET history = ? WHERE id = ?")
            .bind(encoded)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        debug!(user_id = %user_id, appended = entries.len(), total = history.len(), "Appended history");
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> Result<(), StoreError> {
        let _guard = self.locks.lock(user_id).await;
        let result = sqlx::query("UPDATE users SET history = '[]' WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownUser(user_id.to_string()));
        }
        debug!(user_id = %user_id, "Cleared history");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn create_test_db() -> (UserDb, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");
        let db = UserDb::new(db_path.to_str().unwrap())
            .await
            .expect("Failed to create test database");
        (db, temp_dir)
    }

    async fn create_test_user(db: &UserDb, email: &str) -> UserRecord {
        let user = UserRecord::new(
            Uuid::new_v4().to_string(),
            email.to_string(),
            "phc".to_string(),
            serde_json::Map::new(),
        );
        db.create_user(&user).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let (db, _temp_dir) = create_test_db().await;
        let user = create_test_user(&db, "a@example.com").await;

        let by_email = db.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        let by_id = db.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@example.com");
        assert!(db.find_by_email("missing@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (db, _temp_dir) = create_test_db().await;
        create_test_user(&db, "dup@example.com").await;

        let again = UserRecord::new(
            Uuid::new_v4().to_string(),
            "dup@example.com".to_string(),
            "phc".to_string(),
            serde_json::Map::new(),
        );
        match db.create_user(&again).await {
            Err(StoreError::DuplicateEmail(email)) => assert_eq!(email, "dup@example.com"),
            other => panic!("Expected DuplicateEmail, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_unknown_user_is_empty() {
        let (db, _temp_dir) = create_test_db().await;
        assert!(db.load("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_keeps_order_and_clear_empties() {
        let (db, _temp_dir) = create_test_db().await;
        let user = create_test_user(&db, "h@example.com").await;

        db.append(&user.id, &["hello".to_string(), "hi there".to_string()])
            .await
            .unwrap();
        db.append(&user.id, &["how are you".to_string(), "fine".to_string()])
            .await
            .unwrap();
        assert_eq!(
            db.load(&user.id).await.unwrap(),
            vec!["hello", "hi there", "how are you", "fine"]
        );

        db.clear(&user.id).await.unwrap();
        assert!(db.load(&user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutating_unknown_user_fails() {
        let (db, _temp_dir) = create_test_db().await;
        assert!(matches!(
            db.append("ghost", &["x".to_string()]).await,
            Err(StoreError::UnknownUser(_))
        ));
        assert!(matches!(db.clear("ghost").await, Err(StoreError::UnknownUser(_))));
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_nothing() {
        let (db, _temp_dir) = create_test_db().await;
        let db = Arc::new(db);
        let user = create_test_user(&db, "race@example.com").await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let db = db.clone();
            let id = user.id.clone();
            handles.push(tokio::spawn(async move {
                db.append(&id, &[format!("q{}", i), format!("a{}", i)])
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = db.load(&user.id).await.unwrap();
        assert_eq!(history.len(), 40);
        // Each turn's pair stays adjacent.
        for pair in history.chunks(2) {
            assert_eq!(&pair[0][1..], &pair[1][1..]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_for_many_users() {
        let (db, _temp_dir) = create_test_db().await;
        let db = Arc::new(db);

        let mut ids = Vec::new();
        for i in 0..20 {
            ids.push(create_test_user(&db, &format!("user{}@example.com", i)).await.id);
        }

        let mut handles = Vec::new();
        for id in &ids {
            let db = db.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                for round in 0..5 {
                    db.append(&id, &[format!("q{}", round), format!("a{}", round)])
                        .await?;
                }
                Ok::<(), StoreError>(())
            }));
        }

        let mut errors = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await.unwrap() {
                errors.push(e.to_string());
            }
        }
        assert!(errors.is_empty(), "append errors: {:?}", errors);

        for id in &ids {
            let history = db.load(id).await.unwrap();
            assert_eq!(history.len(), 10);
            assert_eq!(history[0], "q0");
            assert_eq!(history[9], "a4");
        }
    }
}
