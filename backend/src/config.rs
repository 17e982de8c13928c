//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults. The gateway reads [`Config`], the world server
//! reads [`WorldConfig`].

use std::env;
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Conversational backend connection
    pub backend: BackendConfig,
    /// Persistence configuration
    pub persistence: PersistenceConfig,
    /// Credential configuration
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Conversational backend connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// WebSocket URL of the world server
    pub url: String,
    /// Bound on a single bridge exchange (in seconds)
    pub bridge_timeout_secs: u64,
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the SQLite database holding users and their history
    pub database_path: String,
}

/// Credential configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens
    pub jwt_secret: String,
    /// Lifetime of an issued token (in hours)
    pub token_ttl_hours: i64,
}

// Keep the secret out of startup logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            backend: BackendConfig {
                url: env::var("BACKEND_URL")
                    .unwrap_or_else(|_| "ws://127.0.0.1:35496/websocket".to_string()),
                bridge_timeout_secs: env::var("BRIDGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(120),
            },
            persistence: PersistenceConfig {
                database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| {
                    // Default to ~/.chat-bridge or current directory
                    if let Some(home) = env::var_os("HOME") {
                        format!("{}/.chat-bridge/users.db", home.to_string_lossy())
                    } else {
                        ".chat-bridge/users.db".to_string()
                    }
                }),
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                    tracing::warn!(
                        "JWT_SECRET not set, using a random per-process secret; \
                         issued tokens will not survive a restart"
                    );
                    format!("{}{}", uuid::Uuid::new_v4(), uuid::Uuid::new_v4())
                }),
                token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(6),
            },
        }
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Bridge exchange bound as a `Duration`
    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.bridge_timeout_secs)
    }

    /// Issued token lifetime as a `Duration`
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_hours.max(0) as u64 * 3600)
    }
}

/// World server (conversational backend) configuration
#[derive(Clone)]
pub struct WorldConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Gemini API key; the echo agent is used when absent
    pub gemini_api_key: Option<String>,
    /// Gemini model name
    pub gemini_model: String,
    /// Gemini API base URL
    pub gemini_api_base_url: String,
    /// Gemini request timeout in seconds
    pub gemini_timeout_secs: u64,
}

impl std::fmt::Debug for WorldConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_model", &self.gemini_model)
            .field("gemini_api_base_url", &self.gemini_api_base_url)
            .field("gemini_timeout_secs", &self.gemini_timeout_secs)
            .finish()
    }
}

impl WorldConfig {
    /// Load world server configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            host: env::var("WORLD_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("WORLD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(35496),
            gemini_api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            gemini_api_base_url: env::var("GEMINI_API_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            gemini_timeout_secs: env::var("GEMINI_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Get the listen address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
