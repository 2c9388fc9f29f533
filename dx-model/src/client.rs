//! Chat-model seam and the OpenAI-compatible HTTP client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::prompt::Prompt;

/// A chat model that turns a prompt into raw reply text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `prompt` and return the assistant's reply text.
    async fn complete(&self, prompt: &Prompt) -> Result<String>;

    /// Model identifier, for logging.
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for the `/chat/completions` route of an OpenAI-compatible API.
///
/// # Example
///
/// ```rust,ignore
/// use dx_model::{ModelConfig, OpenAICompatibleClient};
///
/// let client = OpenAICompatibleClient::new(ModelConfig::new(token))?;
/// let reply = client.complete(&prompt).await?;
/// ```
pub struct OpenAICompatibleClient {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OpenAICompatibleClient {
    /// Create a client. The configured timeout covers the whole request.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create a client for an OpenAI-compatible API with default limits.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Self::new(ModelConfig::compatible(api_key, base_url, model))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[async_trait]
impl ChatModel for OpenAICompatibleClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            max_tokens: self.config.max_tokens,
        };

        debug!(model = %self.config.model, user_chars = prompt.user.chars().count(), "sending completion request");

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(model = %self.config.model, status = status.as_u16(), "completion request rejected");
            return Err(ModelError::Status { status: status.as_u16(), body });
        }

        let text = response.text().await.map_err(|e| self.request_error(e))?;
        extract_content(&text)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

impl OpenAICompatibleClient {
    fn request_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout { timeout: self.config.timeout }
        } else {
            ModelError::Request(e.to_string())
        }
    }
}

/// Pull `choices[0].message.content` out of a completion response body.
pub fn extract_content(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::Envelope(format!("invalid response body: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Envelope("no choices in response".into()))?
        .message
        .content
        .ok_or_else(|| ModelError::Envelope("choice has no message content".into()))
}
