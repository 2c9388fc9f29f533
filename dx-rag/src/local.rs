//! Local sentence embeddings with `all-MiniLM-L6-v2` through fastembed.
//!
//! Only built with the `local` feature. The ONNX model and tokenizer are
//! downloaded on first use and cached on disk; later runs work offline.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Name recorded with collections built by [`MiniLmEmbedder`].
pub const MINILM_NAME: &str = "fastembed:all-MiniLM-L6-v2";
/// Output size of `all-MiniLM-L6-v2`.
pub const MINILM_DIMENSIONS: usize = 384;

fn failure(message: impl Into<String>) -> RagError {
    RagError::EmbeddingError { provider: MINILM_NAME.to_string(), message: message.into() }
}

/// [`EmbeddingProvider`] running `all-MiniLM-L6-v2` in-process.
///
/// Inference is CPU-bound, so each call runs on the blocking thread pool.
///
/// ```rust,ignore
/// use dx_rag::MiniLmEmbedder;
///
/// let embedder = MiniLmEmbedder::new(Some("data/models".into()))?;
/// let vector = embedder.embed("лихорадка, кашель").await?;
/// ```
pub struct MiniLmEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl std::fmt::Debug for MiniLmEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniLmEmbedder").field("name", &MINILM_NAME).finish_non_exhaustive()
    }
}

impl MiniLmEmbedder {
    /// Load the model, downloading it into `cache_dir` (or fastembed's default
    /// cache directory) if it is not there yet.
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let mut options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            info!(cache_dir = %dir.display(), "loading embedding model");
            options = options.with_cache_dir(dir);
        }
        let model =
            TextEmbedding::try_new(options).map_err(|e| failure(format!("failed to load model: {e}")))?;
        Ok(Self { model: Arc::new(Mutex::new(model)) })
    }
}

#[async_trait]
impl EmbeddingProvider for MiniLmEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text]).await?.pop().ok_or_else(|| failure("model returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let model = Arc::clone(&self.model);
        debug!(inputs = owned.len(), "embedding batch locally");

        let vectors = tokio::task::spawn_blocking(move || {
            let model = model.lock().map_err(|_| failure("model lock poisoned"))?;
            model.embed(owned, None).map_err(|e| failure(format!("inference failed: {e}")))
        })
        .await
        .map_err(|e| failure(format!("embedding task failed: {e}")))??;

        check_vectors(vectors, texts.len())
    }

    fn dimensions(&self) -> usize {
        MINILM_DIMENSIONS
    }

    fn name(&self) -> &str {
        MINILM_NAME
    }
}

fn check_vectors(vectors: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(failure(format!("expected {expected} embeddings, model returned {}", vectors.len())));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != MINILM_DIMENSIONS) {
        return Err(failure(format!(
            "model returned {} dimensions, expected {MINILM_DIMENSIONS}",
            bad.len()
        )));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorstore::cosine_distance;

    #[test]
    fn output_shape_is_checked() {
        assert!(check_vectors(vec![vec![0.0; MINILM_DIMENSIONS]; 2], 2).is_ok());
        assert!(check_vectors(vec![vec![0.0; MINILM_DIMENSIONS]], 2).is_err());
        assert!(matches!(
            check_vectors(vec![vec![0.0; 12]], 1),
            Err(RagError::EmbeddingError { .. })
        ));
    }

    #[tokio::test]
    #[ignore = "downloads all-MiniLM-L6-v2 on first run"]
    async fn related_sentences_are_closer() {
        let embedder = MiniLmEmbedder::new(None).unwrap();
        let query = embedder.embed("high fever and a stiff neck").await.unwrap();
        let related = embedder.embed("meningitis presents with fever and neck rigidity").await.unwrap();
        let unrelated = embedder.embed("fracture of the distal radius after a fall").await.unwrap();

        assert_eq!(query.len(), MINILM_DIMENSIONS);
        assert!(cosine_distance(&query, &related) < cosine_distance(&query, &unrelated));
    }
}
