//! OpenRouter chat completion client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::config::OpenRouterConfig;
use crate::error::LlmError;

use super::provider::{ChatClient, ChatMessage, ChatRequest, ChatResponse};

/// Body actually sent on the wire, with config defaults filled in.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

/// `reqwest`-backed client for `POST {base_url}/chat/completions`.
pub struct OpenRouterClient {
    client: reqwest::Client,
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn create_chat_completion(
        &self,
        request: &ChatRequest,
        api_key: &SecretString,
    ) -> Result<ChatResponse, LlmError> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: request.temperature.unwrap_or(self.config.temperature),
            stream: request.stream,
        };

        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion");

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose_secret())
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: Option<serde_json::Value> = resp.json().await.ok();
            let message = body
                .as_ref()
                .and_then(|b| b.pointer("/error/message"))
                .and_then(|m| m.as_str())
                .unwrap_or("OpenRouter API request failed")
                .to_string();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
                body,
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
            model: request.model.clone(),
            reason: format!("malformed completion body: {e}"),
        })
    }
}
