//! Chat-completions endpoint configuration.

use std::time::Duration;

use crate::error::{ModelError, Result};

pub const DEFAULT_BASE_URL: &str = "https://hub.qazcode.ai/v1";
pub const DEFAULT_MODEL: &str = "oss-120b";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelConfig {
    /// Config for the default hub endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::compatible(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL)
    }

    /// Config for any OpenAI-compatible API.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ModelError::InvalidConfig("api key is empty".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ModelError::InvalidConfig(format!(
                "base url '{}' must start with http:// or https://",
                self.base_url
            )));
        }
        if self.model.is_empty() {
            return Err(ModelError::InvalidConfig("model name is empty".into()));
        }
        if self.max_tokens == 0 {
            return Err(ModelError::InvalidConfig("max_tokens must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(ModelError::InvalidConfig("timeout must be non-zero".into()));
        }
        Ok(())
    }
}
