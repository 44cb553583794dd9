//! Conversational assistant client.
//!
//! The request is the ordered `{role, content}` transcript; the response is
//! the assistant's next message.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use coordination::chat::ChatTurn;

use crate::config::EndpointsConfig;
use crate::errors::CollaboratorError;

#[async_trait]
pub trait ConversationalAssistant: Send + Sync {
    async fn reply(&self, turns: &[ChatTurn]) -> Result<String, CollaboratorError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    messages: &'a [ChatTurn],
    chatbot_id: &'a str,
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    text: String,
}

/// Chatbot HTTP API client (non-streaming, bearer auth).
#[derive(Clone)]
pub struct HttpAssistant {
    http: reqwest::Client,
    url: String,
    api_key: String,
    chatbot_id: String,
}

impl HttpAssistant {
    pub fn new(
        url: &str,
        api_key: &str,
        chatbot_id: &str,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::Configuration(format!("assistant client: {e}")))?;
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            chatbot_id: chatbot_id.to_string(),
        })
    }

    /// Build from configuration. `Ok(None)` when no assistant URL is set.
    pub fn from_config(
        config: &EndpointsConfig,
        timeout: Duration,
    ) -> Result<Option<Self>, CollaboratorError> {
        let Some(url) = config.assistant_url.as_deref() else {
            return Ok(None);
        };
        let chatbot_id = config.chatbot_id.as_deref().ok_or_else(|| {
            CollaboratorError::Configuration("chatbot id missing for assistant endpoint".into())
        })?;
        let api_key = config.assistant_api_key.as_deref().unwrap_or_default();
        Self::new(url, api_key, chatbot_id, timeout).map(Some)
    }
}

#[async_trait]
impl ConversationalAssistant for HttpAssistant {
    async fn reply(&self, turns: &[ChatTurn]) -> Result<String, CollaboratorError> {
        let body = ChatRequest {
            messages: turns,
            chatbot_id: &self.chatbot_id,
            stream: false,
            temperature: 0.0,
        };
        debug!(turns = turns.len(), "Sending chat request");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::rejected(
                "assistant",
                status.as_u16(),
                message,
            ));
        }

        let parsed: ChatResponse = response.json().await?;
        if parsed.text.trim().is_empty() {
            return Err(CollaboratorError::InvalidResponse(
                "assistant returned an empty reply".into(),
            ));
        }
        Ok(parsed.text)
    }
}
