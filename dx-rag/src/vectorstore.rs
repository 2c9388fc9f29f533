//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;

use crate::document::{CollectionInfo, IndexEntry, SearchResult};
use crate::error::Result;

/// Default upper bound on entries per [`VectorStore::add`] call.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 5000;

/// A storage backend for vector embeddings with nearest-neighbour search.
///
/// Implementations manage named collections of [`IndexEntry`]s. Handles are
/// shared across concurrently served requests, so every method takes `&self`.
///
/// # Example
///
/// ```rust,ignore
/// use dx_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("protocols", &info).await?;
/// store.add("protocols", &entries).await?;
/// let results = store.search("protocols", &query_embedding, 5).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, info: &CollectionInfo) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Return the collection's build-time facts, or `None` if it does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// List collection names in sorted order.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Number of entries in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Add entries to a collection.
    ///
    /// Fails without writing anything if `entries` exceeds
    /// [`max_batch_size`](VectorStore::max_batch_size), if an embedding has the
    /// wrong dimensionality, or if any ID is already present
    /// ([`RagError::DuplicateId`](crate::RagError::DuplicateId)).
    async fn add(&self, collection: &str, entries: &[IndexEntry]) -> Result<()>;

    /// Return up to `limit` entries, in ID order, without embeddings.
    async fn peek(&self, collection: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Search for the `top_k` nearest entries to the given embedding.
    ///
    /// Returns results ordered by ascending distance.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Largest number of entries accepted by a single [`add`](VectorStore::add).
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

/// Compute cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Returns 1.0 if either vector has zero magnitude.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
