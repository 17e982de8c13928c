//! Gateway
//!
//! The synchronous request surface behind the HTTP handlers: authenticates
//! the caller, attaches their stored history, drives one bridge exchange and
//! persists the completed turn.

use crate::auth::{hash_password, verify_password, AuthError, TokenIssuer};
use crate::chat::protocol::{is_boilerplate, APOLOGY, HISTORY_CLEARED, SESSION_ENDED};
use crate::chat::{strip_unsafe, Bridge, BridgeError, BridgeStats, Utterance};
use crate::error::AppError;
use crate::store::{SessionStore, UserDb, UserRecord};
use crate::world::ControlToken;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Throwaway round trips that walk a fresh backend session to the
/// Overworld's prompted state
const PRIMING_ROUND_TRIPS: usize = 2;

/// Result of one interact call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractReply {
    /// Sanitized reply text
    pub text: String,
    /// Backend ended the episode with this reply
    pub episode_done: bool,
}

impl InteractReply {
    fn apology() -> Self {
        Self {
            text: APOLOGY.to_string(),
            episode_done: false,
        }
    }
}

/// Account fields supplied at signup
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Login email
    pub email: String,
    /// Plaintext password; hashed before storage
    pub password: String,
    /// Any extra signup fields
    pub profile: serde_json::Map<String, serde_json::Value>,
}

/// Health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    /// Bridge instrumentation
    pub bridge: BridgeStats,
    /// Whether the backend channel is closed
    pub channel_closed: bool,
    /// Whether priming has completed
    pub primed: bool,
}

/// Conversational gateway shared by every request
pub struct Gateway {
    store: Arc<dyn SessionStore>,
    users: Arc<UserDb>,
    bridge: Arc<Bridge>,
    tokens: TokenIssuer,
    primed: OnceCell<()>,
}

impl Gateway {
    /// Create the gateway
    ///
    /// # Arguments
    /// * `store` - History storage
    /// * `users` - Account records
    /// * `bridge` - The process-wide bridge
    /// * `tokens` - Bearer token issuer/verifier
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<UserDb>,
        bridge: Arc<Bridge>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            store,
            users,
            bridge,
            tokens,
            primed: OnceCell::new(),
        }
    }

    /// Resolve a credential to a user identifier
    ///
    /// Has no side effects; fails for missing, malformed or expired tokens
    /// and for tokens naming a user that no longer exists.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<String, AppError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Missing)?;
        let claims = self.tokens.verify(token)?;

        if self.users.find_by_id(&claims.sub).await?.is_none() {
            return Err(AppError::AuthInvalid(format!("unknown user {}", claims.sub)));
        }
        Ok(claims.sub)
    }

    /// Drive the priming round trips once per process
    ///
    /// A failed attempt leaves the gateway unprimed so the next request
    /// retries.
    pub async fn prime(&self) -> Result<(), AppError> {
        self.primed
            .get_or_try_init(|| async {
                info!("Priming backend session");
                for _ in 0..PRIMING_ROUND_TRIPS {
                    let reply = self.exchange(&Utterance::bare("")).await?;
                    debug!(reply = %reply, "Priming reply");
                }
                Ok::<(), BridgeError>(())
            })
            .await?;
        Ok(())
    }

    /// Forward one user utterance with their history and record the turn
    pub async fn interact(
        &self,
        credential: Option<&str>,
        text: &str,
    ) -> Result<InteractReply, AppError> {
        let user_id = self.authenticate(credential).await?;
        match self.prime().await {
            Err(AppError::BridgeTimeout(secs)) => {
                warn!(user_id = %user_id, timeout_secs = secs, "Priming timed out");
                return Ok(InteractReply::apology());
            }
            other => other?,
        }

        let history = self.store.load(&user_id).await?;
        let utterance = Utterance::with_history(text, history);

        let raw = match self.exchange(&utterance).await {
            Ok(raw) => raw,
            Err(BridgeError::Timeout(bound)) => {
                warn!(user_id = %user_id, timeout = ?bound, "Backend timed out, history reset");
                return Ok(InteractReply::apology());
            }
            Err(e) => return Err(e.into()),
        };

        let reply = strip_unsafe(&raw);
        if !is_boilerplate(&reply) {
            self.store
                .append(&user_id, &[text.to_string(), reply.clone()])
                .await?;
        }

        Ok(InteractReply {
            episode_done: reply == SESSION_ENDED,
            text: reply,
        })
    }

    /// Reset the backend agent, then clear the caller's history
    ///
    /// Stored history is left untouched when the backend round trip fails.
    pub async fn reset(&self, credential: Option<&str>) -> Result<(), AppError> {
        let user_id = self.authenticate(credential).await?;
        self.prime().await?;

        let reply = self
            .exchange(&Utterance::bare(ControlToken::Reset.literal()))
            .await?;
        self.store.clear(&user_id).await?;
        info!(user_id = %user_id, reply = %reply, "History reset");
        Ok(())
    }

    /// Stored history of the caller; never touches the backend
    pub async fn history(&self, credential: Option<&str>) -> Result<Vec<String>, AppError> {
        let user_id = self.authenticate(credential).await?;
        Ok(self.store.load(&user_id).await?)
    }

    /// Register a new account
    pub async fn signup(&self, account: NewAccount) -> Result<String, AppError> {
        let email = account.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::InvalidRequest("A valid email is required".to_string()));
        }
        if account.password.is_empty() {
            return Err(AppError::InvalidRequest("Password cannot be empty".to_string()));
        }

        let password_hash = hash_password(&account.password)?;
        let user = UserRecord::new(
            Uuid::new_v4().to_string(),
            email,
            password_hash,
            account.profile,
        );
        self.users.create_user(&user).await?;

        info!(user_id = %user.id, "User signed up");
        Ok(user.id)
    }

    /// Check credentials and issue a token
    ///
    /// # Returns
    /// * `Ok(Some(token))` - credentials match
    /// * `Ok(None)` - unknown email or wrong password
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<String>, AppError> {
        let Some(user) = self.users.find_by_email(email.trim()).await? else {
            debug!("Login for unknown email");
            return Ok(None);
        };
        if !verify_password(password, &user.password_hash) {
            debug!(user_id = %user.id, "Login with wrong password");
            return Ok(None);
        }

        let token = self.tokens.issue(&user.id)?;
        info!(user_id = %user.id, "User logged in");
        Ok(Some(token))
    }

    /// Current health snapshot
    pub fn health(&self) -> GatewayHealth {
        GatewayHealth {
            bridge: self.bridge.stats(),
            channel_closed: self.bridge.channel().is_closed(),
            primed: self.primed.initialized(),
        }
    }

    /// One bridge exchange; a timeout resets the backend before the next
    /// caller is admitted
    async fn exchange(&self, utterance: &Utterance) -> Result<String, BridgeError> {
        let reset = Utterance::bare(ControlToken::Reset.literal());
        self.bridge
            .exchange_or_recover(utterance, &reset, &[HISTORY_CLEARED])
            .await
    }
}
