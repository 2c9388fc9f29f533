//! Remote embeddings through an OpenAI-compatible `/embeddings` endpoint.
//!
//! Only built with the `openai` feature.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
/// Most inputs the public API accepts in one request.
const MAX_INPUTS_PER_REQUEST: usize = 2048;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variables checked, in order, by [`OpenAIEmbeddingProvider::from_env`].
pub const API_KEY_ENV: [&str; 2] = ["DX_EMBEDDING_API_KEY", "OPENAI_API_KEY"];

fn failure(message: impl Into<String>) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.to_string(), message: message.into() }
}

/// [`EmbeddingProvider`] backed by a hosted embedding model.
///
/// Batches larger than the API's per-request input limit are split into
/// several requests; vectors come back in input order. The provider's
/// [`name`](EmbeddingProvider::name) is `openai:<model>`, which is what gets
/// recorded with a collection built from it.
///
/// ```rust,ignore
/// use dx_rag::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new(key)?
///     .with_base_url("https://hub.example.org/v1")
///     .with_dimensions(512);
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    name: String,
    dimensions: usize,
    request_dimensions: Option<usize>,
}

impl std::fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OpenAIEmbeddingProvider {
    /// Provider for `text-embedding-3-small` (1536 dimensions) on the public API.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(failure("API key must not be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| failure(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            name: format!("{PROVIDER}:{DEFAULT_MODEL}"),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Read the key from the first set variable in [`API_KEY_ENV`].
    pub fn from_env() -> Result<Self> {
        let key = API_KEY_ENV
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .ok_or_else(|| failure(format!("none of {API_KEY_ENV:?} is set")))?;
        Self::new(key)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.name = format!("{PROVIDER}:{}", self.model);
        self
    }

    /// Ask the API to shorten vectors to `dims` (models that support it).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, model = %self.model, error = %e, "request failed");
                failure(format!("request failed: {e}"))
            })?;

        let status = response.status();
        let text =
            response.text().await.map_err(|e| failure(format!("failed to read body: {e}")))?;
        if !status.is_success() {
            let detail =
                serde_json::from_str::<ApiError>(&text).map(|e| e.error.message).unwrap_or(text);
            error!(provider = PROVIDER, model = %self.model, %status, "embedding API error");
            return Err(failure(format!("API returned {status}: {detail}")));
        }

        let mut parsed: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|e| failure(format!("failed to parse response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(failure(format!(
                "expected {} embeddings, API returned {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(failure(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                bad.len(),
                self.dimensions
            )));
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .pop()
            .ok_or_else(|| failure("API returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for part in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            debug!(provider = PROVIDER, model = %self.model, inputs = part.len(), "embedding batch");
            vectors.extend(self.request(part).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new("  "), Err(RagError::EmbeddingError { .. })));
    }

    #[test]
    fn name_tracks_model_and_dimensions_override() {
        let provider = OpenAIEmbeddingProvider::new("sk-test")
            .unwrap()
            .with_model("text-embedding-3-large")
            .with_dimensions(256)
            .with_base_url("http://localhost:9000/v1/");
        assert_eq!(provider.dimensions(), 256);
        assert_eq!(provider.name(), "openai:text-embedding-3-large");
        assert_eq!(provider.base_url, "http://localhost:9000/v1");
        assert!(!format!("{provider:?}").contains("sk-test"));
    }

    #[test]
    fn response_is_reordered_by_index() {
        let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_request() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap();
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }
}
