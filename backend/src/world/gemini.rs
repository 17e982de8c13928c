//! Gemini-backed agent
//!
//! Keeps the conversation as alternating `user`/`model` turns and sends the
//! whole of it to `generateContent` on every act.

use crate::config::WorldConfig;
use crate::world::agent::{Agent, AgentError};
use crate::world::gemini_types::{Content, GenerateContentRequest, GenerateContentResponse};
use async_trait::async_trait;
use std::time::Duration;

const USER_ROLE: &str = "user";
const MODEL_ROLE: &str = "model";

/// Connection settings shared by every Gemini agent of a server
#[derive(Clone)]
pub struct GeminiSettings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiSettings {
    /// Build settings with a pooled HTTP client
    ///
    /// # Returns
    /// * `Err(AgentError::Request)` if the API key is empty or the client
    ///   cannot be built
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        if api_key.is_empty() {
            return Err(AgentError::Request("API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Settings from the world server configuration, if a key is configured
    pub fn from_config(config: &WorldConfig) -> Result<Option<Self>, AgentError> {
        config
            .gemini_api_key
            .as_deref()
            .map(|key| {
                Self::new(
                    key,
                    &config.gemini_model,
                    &config.gemini_api_base_url,
                    Duration::from_secs(config.gemini_timeout_secs),
                )
            })
            .transpose()
    }
}

/// Agent answering through the Gemini API
pub struct GeminiAgent {
    settings: GeminiSettings,
    turns: Vec<Content>,
}

impl GeminiAgent {
    /// Create an agent with an empty conversation
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            settings,
            turns: Vec::new(),
        }
    }

    async fn generate(&self) -> Result<String, AgentError> {
        let settings = &self.settings;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            settings.base_url, settings.model, settings.api_key
        );
        let request_body = GenerateContentRequest {
            contents: self.turns.clone(),
        };

        tracing::debug!(
            model = %settings.model,
            turns = self.turns.len(),
            "Calling Gemini API"
        );

        let response = settings
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AgentError::Request(format!("Failed to send HTTP request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!(
                status_code = status.as_u16(),
                error_body = %error_body,
                "Gemini API returned error status"
            );
            return Err(AgentError::Request(format!(
                "Gemini API returned error status {}: {}",
                status.as_u16(),
                error_body
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Request(format!("Failed to parse response: {}", e)))?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AgentError::Blocked(reason));
        }

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl Agent for GeminiAgent {
    fn observe(&mut self, text: &str) {
        self.turns.push(Content::text(USER_ROLE, text));
    }

    async fn act(&mut self) -> Result<Option<String>, AgentError> {
        if self.turns.last().map(|t| t.role.as_str()) != Some(USER_ROLE) {
            return Ok(None);
        }
        match self.generate().await {
            Ok(text) => {
                self.turns.push(Content::text(MODEL_ROLE, text.clone()));
                Ok(Some(text))
            }
            Err(e) => {
                // Drop the unanswered turn so the conversation stays alternating.
                self.turns.pop();
                Err(e)
            }
        }
    }

    fn reset(&mut self) {
        self.turns.clear();
    }

    fn replace_history(&mut self, history: &[String]) {
        self.turns = history
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let role = if i % 2 == 0 { USER_ROLE } else { MODEL_ROLE };
                Content::text(role, text.as_str())
            })
            .collect();
    }

    fn shutdown(&mut self) {
        tracing::debug!(turns = self.turns.len(), "Gemini agent shut down");
        self.turns.clear();
    }
}
