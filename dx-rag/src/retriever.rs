//! Query-time nearest-neighbour retrieval.

use std::sync::Arc;

use tracing::{debug, error};

use crate::document::{CollectionInfo, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Ordered retrieval output, nearest first.
pub type RetrievalResult = Vec<SearchResult>;

/// Embeds queries and fetches the nearest chunks from one collection.
///
/// A retriever is opened once at startup and shared read-only across requests.
/// Opening verifies that the collection exists and was built with the same
/// embedding function, since a mismatched embedder returns meaningless
/// neighbours without any error.
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    info: CollectionInfo,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("collection", &self.collection)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Open a retriever over `collection`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexUnavailable`] if the collection does not exist.
    /// - [`RagError::EmbeddingMismatch`] if the collection was built with a
    ///   different embedder name or dimensionality.
    pub async fn open(
        vector_store: Arc<dyn VectorStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let collection = collection.into();
        let info = vector_store
            .collection_info(&collection)
            .await?
            .ok_or_else(|| RagError::IndexUnavailable { collection: collection.clone() })?;

        let query_info = CollectionInfo {
            dimensions: embedding_provider.dimensions(),
            embedder: embedding_provider.name().to_string(),
        };
        if info != query_info {
            return Err(RagError::EmbeddingMismatch {
                collection,
                indexed: info.signature(),
                query: query_info.signature(),
            });
        }

        Ok(Self { embedding_provider, vector_store, collection, info })
    }

    /// Name of the collection this retriever reads.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Build-time facts of the collection.
    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    /// Return at most `k` chunks nearest to `text`, ordered by ascending distance.
    ///
    /// An empty collection yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `k == 0`, or the embedding/store error.
    pub async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::ConfigError("k must be at least 1".to_string()));
        }

        let embedding = self.embedding_provider.embed(text).await.map_err(|e| {
            error!(collection = %self.collection, error = %e, "query embedding failed");
            e
        })?;

        let results =
            self.vector_store.search(&self.collection, &embedding, k).await.map_err(|e| {
                error!(collection = %self.collection, error = %e, "vector store search failed");
                e
            })?;

        debug!(collection = %self.collection, k, result_count = results.len(), "query completed");
        Ok(results)
    }
}
