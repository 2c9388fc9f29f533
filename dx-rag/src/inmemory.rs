//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `BTreeMap` protected by a `tokio::sync::RwLock`. It is suitable for tests
//! and small corpora; [`FileVectorStore`](crate::FileVectorStore) persists the
//! same structure to disk.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{CollectionInfo, IndexEntry, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{DEFAULT_MAX_BATCH_SIZE, VectorStore, cosine_distance};

/// One named collection: its build-time facts and entries keyed by ID.
#[derive(Debug, Clone)]
pub(crate) struct Collection {
    pub(crate) info: CollectionInfo,
    pub(crate) entries: BTreeMap<String, IndexEntry>,
}

impl Collection {
    pub(crate) fn new(info: CollectionInfo) -> Self {
        Self { info, entries: BTreeMap::new() }
    }

    /// Validate and insert a batch; nothing is inserted if any entry fails.
    pub(crate) fn add(
        &mut self,
        backend: &str,
        name: &str,
        entries: &[IndexEntry],
        max_batch_size: usize,
    ) -> Result<()> {
        self.check_batch(backend, name, entries, max_batch_size)?;
        self.insert(entries);
        Ok(())
    }

    /// Check size, dimensions and ID uniqueness of a batch without changing anything.
    pub(crate) fn check_batch(
        &self,
        backend: &str,
        name: &str,
        entries: &[IndexEntry],
        max_batch_size: usize,
    ) -> Result<()> {
        if entries.len() > max_batch_size {
            return Err(RagError::VectorStoreError {
                backend: backend.to_string(),
                message: format!(
                    "batch of {} entries exceeds the limit of {max_batch_size}",
                    entries.len()
                ),
            });
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in entries {
            if entry.embedding.len() != self.info.dimensions {
                return Err(RagError::VectorStoreError {
                    backend: backend.to_string(),
                    message: format!(
                        "entry '{}' has {} dimensions, collection '{name}' expects {}",
                        entry.id,
                        entry.embedding.len(),
                        self.info.dimensions
                    ),
                });
            }
            if self.entries.contains_key(&entry.id) || !seen.insert(entry.id.as_str()) {
                return Err(RagError::DuplicateId {
                    collection: name.to_string(),
                    id: entry.id.clone(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn insert(&mut self, entries: &[IndexEntry]) {
        for entry in entries {
            self.entries.insert(entry.id.clone(), entry.clone());
        }
    }

    pub(crate) fn peek(&self, limit: usize) -> Vec<SearchResult> {
        self.entries
            .values()
            .take(limit)
            .map(|entry| SearchResult {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                distance: 0.0,
            })
            .collect()
    }

    pub(crate) fn search(&self, embedding: &[f32], top_k: usize) -> Vec<SearchResult> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .values()
            .map(|entry| (cosine_distance(&entry.embedding, embedding), entry))
            .collect();

        // Stable sort keeps ID order among equal distances.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(distance, entry)| SearchResult {
                id: entry.id.clone(),
                document: entry.document.clone(),
                metadata: entry.metadata.clone(),
                distance,
            })
            .collect()
    }
}

pub(crate) fn missing(backend: &str, name: &str) -> RagError {
    RagError::VectorStoreError {
        backend: backend.to_string(),
        message: format!("collection '{name}' does not exist"),
    }
}

/// An in-memory vector store using cosine distance for search.
///
/// Collections are stored as nested maps: collection name → entry ID → entry.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use dx_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new().with_max_batch_size(100);
/// store.create_collection("protocols", &info).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    max_batch_size: usize,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self { collections: RwLock::default(), max_batch_size: DEFAULT_MAX_BATCH_SIZE }
    }
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-write entry limit.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }
}

const BACKEND: &str = "InMemory";

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, info: &CollectionInfo) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert_with(|| Collection::new(info.clone()));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.info.clone()))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections.keys().cloned().collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(BACKEND, collection))?;
        Ok(store.entries.len())
    }

    async fn add(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(BACKEND, collection))?;
        store.add(BACKEND, collection, entries, self.max_batch_size)
    }

    async fn peek(&self, collection: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(BACKEND, collection))?;
        Ok(store.peek(limit))
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(BACKEND, collection))?;
        Ok(store.search(embedding, top_k))
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}
