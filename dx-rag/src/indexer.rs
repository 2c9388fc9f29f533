//! Offline index build: chunk → embed → write in bounded batches.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, FixedSizeChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, CollectionInfo, IndexEntry, ProtocolRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// What to do with an existing collection of the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RebuildMode {
    /// Delete the collection, create it empty, then write every chunk.
    /// Building the same corpus twice yields the same entry count.
    #[default]
    Recreate,
    /// Keep existing entries and add the new ones. Any chunk ID that is already
    /// present fails the build with [`RagError::DuplicateId`] before anything
    /// is written.
    Append,
}

impl FromStr for RebuildMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "recreate" => Ok(Self::Recreate),
            "append" => Ok(Self::Append),
            other => Err(RagError::ConfigError(format!(
                "unknown rebuild mode '{other}' (expected 'recreate' or 'append')"
            ))),
        }
    }
}

impl fmt::Display for RebuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recreate => f.write_str("recreate"),
            Self::Append => f.write_str("append"),
        }
    }
}

/// Builds a collection from protocol records.
///
/// # Example
///
/// ```rust,ignore
/// use dx_rag::{Indexer, RagConfig, RebuildMode};
///
/// let indexer = Indexer::new(RagConfig::default(), embedder, store)?;
/// let written = indexer.build(&records, RebuildMode::Recreate).await?;
/// ```
pub struct Indexer {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: FixedSizeChunker,
}

impl Indexer {
    /// Create an indexer writing to `config.collection`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the chunk sizes are invalid.
    pub fn new(
        config: RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        let chunker = FixedSizeChunker::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self { config, embedding_provider, vector_store, chunker })
    }

    /// Return a reference to the indexer configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Effective write batch size: the configured size, capped by the store limit.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size.min(self.vector_store.max_batch_size()).max(1)
    }

    /// Chunk, embed and store every record. Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// - [`RagError::DuplicateId`] if two chunks share an ID, or (in
    ///   [`RebuildMode::Append`]) a chunk ID already exists in the collection.
    /// - [`RagError::EmbeddingMismatch`] when appending to a collection built
    ///   with a different embedder.
    /// - Embedding and vector store errors from the backends. Every chunk is
    ///   embedded before the collection is touched, so an embedding failure
    ///   leaves the previous index in place. A write failure during
    ///   [`RebuildMode::Recreate`] removes the collection rather than leave a
    ///   truncated one behind.
    pub async fn build(&self, records: &[ProtocolRecord], mode: RebuildMode) -> Result<usize> {
        let collection = self.config.collection.as_str();
        let info = CollectionInfo {
            dimensions: self.embedding_provider.dimensions(),
            embedder: self.embedding_provider.name().to_string(),
        };

        let chunks: Vec<Chunk> = records.iter().flat_map(|r| self.chunker.chunk(r)).collect();
        self.check_unique(collection, &chunks, mode).await?;

        let batch_size = self.batch_size();
        info!(
            collection,
            %mode,
            records = records.len(),
            chunks = chunks.len(),
            batch_size,
            "building index"
        );

        // Embed everything up front: an embedder failure must leave the
        // existing collection exactly as it was.
        let mut entries = Vec::with_capacity(chunks.len());
        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            entries.extend(self.embed_batch(collection, batch_index, batch).await?);
        }

        self.prepare_collection(collection, &info, mode).await?;

        let mut written = 0;
        for (batch_index, batch) in entries.chunks(batch_size).enumerate() {
            if let Err(e) = self.vector_store.add(collection, batch).await {
                error!(collection, batch = batch_index, error = %e, "write failed during build");
                if mode == RebuildMode::Recreate {
                    self.discard(collection).await;
                }
                return Err(e);
            }

            written += batch.len();
            info!(
                collection,
                batch = batch_index,
                from = written - batch.len(),
                to = written,
                "wrote batch"
            );
        }

        info!(collection, written, "index build complete");
        Ok(written)
    }

    async fn embed_batch(
        &self,
        collection: &str,
        batch_index: usize,
        batch: &[Chunk],
    ) -> Result<Vec<IndexEntry>> {
        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(collection, batch = batch_index, error = %e, "embedding failed during build");
            e
        })?;
        if embeddings.len() != batch.len() {
            return Err(RagError::EmbeddingError {
                provider: self.embedding_provider.name().to_string(),
                message: format!(
                    "expected {} embeddings, provider returned {}",
                    batch.len(),
                    embeddings.len()
                ),
            });
        }
        debug!(collection, batch = batch_index, chunks = batch.len(), "embedded batch");

        Ok(batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry::from_chunk(chunk, embedding))
            .collect())
    }

    /// Drop a collection whose rebuild failed part-way, so the truncated index
    /// cannot be opened for queries.
    async fn discard(&self, collection: &str) {
        match self.vector_store.delete_collection(collection).await {
            Ok(()) => warn!(collection, "removed partially written collection"),
            Err(e) => {
                error!(collection, error = %e, "failed to remove partially written collection")
            }
        }
    }

    async fn prepare_collection(
        &self,
        collection: &str,
        info: &CollectionInfo,
        mode: RebuildMode,
    ) -> Result<()> {
        match mode {
            RebuildMode::Recreate => {
                self.vector_store.delete_collection(collection).await?;
                self.vector_store.create_collection(collection, info).await
            }
            RebuildMode::Append => match self.vector_store.collection_info(collection).await? {
                Some(existing) if existing != *info => Err(RagError::EmbeddingMismatch {
                    collection: collection.to_string(),
                    indexed: existing.signature(),
                    query: info.signature(),
                }),
                Some(_) => Ok(()),
                None => self.vector_store.create_collection(collection, info).await,
            },
        }
    }

    /// Reject colliding chunk IDs before anything is embedded or written.
    async fn check_unique(
        &self,
        collection: &str,
        chunks: &[Chunk],
        mode: RebuildMode,
    ) -> Result<()> {
        let mut seen = HashSet::with_capacity(chunks.len());
        for chunk in chunks {
            if !seen.insert(chunk.id.as_str()) {
                warn!(collection, id = %chunk.id, "duplicate chunk id in corpus");
                return Err(RagError::DuplicateId {
                    collection: collection.to_string(),
                    id: chunk.id.clone(),
                });
            }
        }

        let exists = self.vector_store.collection_info(collection).await?.is_some();
        if mode == RebuildMode::Append && exists {
            let stored = self.vector_store.count(collection).await?;
            let existing = self.vector_store.peek(collection, stored).await?;
            if let Some(clash) = existing.iter().find(|e| seen.contains(e.id.as_str())) {
                return Err(RagError::DuplicateId {
                    collection: collection.to_string(),
                    id: clash.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_mode_parses() {
        assert_eq!("recreate".parse::<RebuildMode>().unwrap(), RebuildMode::Recreate);
        assert_eq!("append".parse::<RebuildMode>().unwrap(), RebuildMode::Append);
        assert!("merge".parse::<RebuildMode>().is_err());
        assert_eq!(RebuildMode::default(), RebuildMode::Recreate);
    }
}
