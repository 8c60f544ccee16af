//! One POST per message to a chat-completion endpoint.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ChatError, Result};
use crate::keystore::ApiKey;
use crate::providers::{ApiErrorEnvelope, ChatRequest, ChatResponse};
use crate::request::redacted_body;

pub struct ChatClient {
    client: Client,
    api_key: ApiKey,
    endpoint: String,
}

impl ChatClient {
    pub fn new(api_key: ApiKey, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(ChatClient {
            client,
            api_key,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `request` and return the assistant's text.
    ///
    /// # Returns
    /// - `Ok(text)`: first choice content of a 2xx response.
    /// - `Err(ChatError::Api)`: non-2xx, carrying `error.message` or `"Unknown error"`.
    /// - `Err(ChatError::NoResponse)`: 2xx with no usable content.
    /// - `Err(ChatError::Http)` / `Err(ChatError::Decode)`: transport or JSON failure.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        debug!(endpoint = %self.endpoint, body = %redacted_body(request), "sending chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorEnvelope>(&bytes)
                .map(|env| env.message_or_unknown())
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(status = status.as_u16(), %message, "chat endpoint returned an error");
            return Err(ChatError::Api(message));
        }

        let parsed: ChatResponse =
            serde_json::from_slice(&bytes).map_err(|e| ChatError::Decode(e.to_string()))?;
        let content = parsed.first_content().ok_or(ChatError::NoResponse)?;
        debug!(chars = content.len(), "chat reply received");
        Ok(content.to_string())
    }
}
