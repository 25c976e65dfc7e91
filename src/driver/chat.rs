use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Value, json};

use crate::{
    config::ChatConfig,
    driver::{
        credentials::{CredentialRef, resolve_auth_header},
        error::{
            DriverError, configuration_error, map_http_error, protocol_violation,
            upstream_failure,
        },
    },
};

/// Sends one free-text message to a conversational model and returns its reply.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, message: &str) -> Result<String, DriverError>;
}

/// Talks to any service exposing `POST <endpoint>/chat/completions`.
#[derive(Clone)]
pub struct OpenAiCompatibleChatClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    credential: CredentialRef,
    timeout: Duration,
}

impl OpenAiCompatibleChatClient {
    pub fn from_config(config: &ChatConfig, timeout: Duration) -> Result<Self, DriverError> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or_else(|| configuration_error("driver.chat.endpoint is not configured"))?;
        let model = config
            .model
            .clone()
            .filter(|model| !model.trim().is_empty())
            .ok_or_else(|| configuration_error("driver.chat.model is not configured"))?;

        Ok(Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client must build"),
            endpoint,
            model,
            max_tokens: config.max_tokens,
            credential: config.credential.clone(),
            timeout,
        })
    }

    pub fn request_body(&self, message: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": message }],
            "max_tokens": self.max_tokens,
            "stream": false,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleChatClient {
    async fn complete(&self, message: &str) -> Result<String, DriverError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        let started_at = Instant::now();

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&self.request_body(message));
        if let Some(auth_header) = resolve_auth_header(&self.credential, "chat")? {
            request = request.header(header::AUTHORIZATION, auth_header);
        }

        let response = request
            .send()
            .await
            .map_err(|err| upstream_failure(format!("chat request failed: {err}")))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error("chat", status, &body));
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| protocol_violation(format!("invalid chat response payload: {err}")))?;
        tracing::debug!(
            target: "driver.chat",
            model = %self.model,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "chat_completed"
        );
        extract_chat_text(&payload)
    }
}

/// Text of the first choice in a chat completion payload.
pub fn extract_chat_text(payload: &Value) -> Result<String, DriverError> {
    let choice = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| protocol_violation("chat response missing choices"))?;

    choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| protocol_violation("chat response choice has no text content"))
}
