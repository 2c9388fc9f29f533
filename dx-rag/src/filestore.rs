//! Persistent vector store backed by JSON files.
//!
//! Each collection is two files in the store directory: `<name>.json` holds
//! the collection's [`CollectionInfo`] and `<name>.entries.jsonl` holds one
//! [`IndexEntry`] per line. The whole directory is loaded when the store is
//! opened and searches run against the in-memory copy. A write appends only
//! the new batch, and memory is updated only once the batch is on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::validate_collection_name;
use crate::document::{CollectionInfo, IndexEntry, SearchResult};
use crate::error::{RagError, Result};
use crate::inmemory::{Collection, missing};
use crate::vectorstore::{DEFAULT_MAX_BATCH_SIZE, VectorStore};

const BACKEND: &str = "File";
const ENTRIES_SUFFIX: &str = "entries.jsonl";

fn store_error(message: String) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message }
}

/// A [`VectorStore`] persisted to a local directory.
///
/// # Example
///
/// ```rust,ignore
/// use dx_rag::{FileVectorStore, VectorStore};
///
/// let store = FileVectorStore::open("data/index").await?;
/// println!("{:?}", store.list_collections().await?);
/// ```
#[derive(Debug)]
pub struct FileVectorStore {
    dir: PathBuf,
    collections: RwLock<BTreeMap<String, Collection>>,
    max_batch_size: usize,
}

impl FileVectorStore {
    /// Open (creating if needed) a store rooted at `dir` and load every collection in it.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut collections = BTreeMap::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file()
                || path.extension().is_none_or(|ext| ext != "json")
            {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let collection = load_collection(&path, &entries_path(&dir, &name)).await?;
            debug!(collection = %name, entries = collection.entries.len(), "loaded collection");
            collections.insert(name, collection);
        }

        info!(dir = %dir.display(), collections = collections.len(), "opened file vector store");
        Ok(Self { dir, collections: RwLock::new(collections), max_batch_size: DEFAULT_MAX_BATCH_SIZE })
    }

    /// Override the per-write entry limit.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn info_path(&self, name: &str) -> Result<PathBuf> {
        validate_collection_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Write the info file and an empty entries file.
    async fn persist_new(&self, name: &str, info: &CollectionInfo) -> Result<()> {
        let path = self.info_path(name)?;
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec(info)
            .map_err(|e| store_error(format!("failed to serialize collection '{name}': {e}")))?;
        tokio::fs::write(entries_path(&self.dir, name), b"").await?;
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Append a validated batch. On failure the file is cut back to its
    /// previous length so a torn batch never reaches the next `open`.
    async fn append(&self, name: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut lines = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut lines, entry)
                .map_err(|e| store_error(format!("failed to serialize entry '{}': {e}", entry.id)))?;
            lines.push(b'\n');
        }

        let path = entries_path(&self.dir, name);
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        let before = file.metadata().await?.len();
        let written = async {
            file.write_all(&lines).await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            warn!(collection = name, error = %e, "append failed, truncating entries file");
            if let Err(trunc) = file.set_len(before).await {
                warn!(collection = name, error = %trunc, "failed to truncate entries file");
            }
            return Err(e.into());
        }
        debug!(collection = name, entries = entries.len(), bytes = lines.len(), "appended batch");
        Ok(())
    }
}

fn entries_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{ENTRIES_SUFFIX}"))
}

async fn load_collection(info_path: &Path, entries_path: &Path) -> Result<Collection> {
    let raw = tokio::fs::read_to_string(info_path).await?;
    let info: CollectionInfo = serde_json::from_str(&raw)
        .map_err(|e| store_error(format!("failed to load {}: {e}", info_path.display())))?;
    let mut collection = Collection::new(info);

    let lines = match tokio::fs::read_to_string(entries_path).await {
        Ok(lines) => lines,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    for (index, line) in lines.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        let entry: IndexEntry = serde_json::from_str(line).map_err(|e| {
            store_error(format!("failed to load {} line {}: {e}", entries_path.display(), index + 1))
        })?;
        collection.entries.insert(entry.id.clone(), entry);
    }
    Ok(collection)
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn create_collection(&self, name: &str, info: &CollectionInfo) -> Result<()> {
        validate_collection_name(name)?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(());
        }
        self.persist_new(name, info).await?;
        collections.insert(name.to_string(), Collection::new(info.clone()));
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        // Info file first: without it the entries file is never loaded.
        let paths = [self.info_path(name)?, entries_path(&self.dir, name)];
        let mut collections = self.collections.write().await;
        collections.remove(name);
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(collection = name, path = %path.display(), error = %e, "failed to remove collection file");
                    return Err(e.into());
                }
            }
        }
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
        store.check_batch(BACKEND, collection, entries, self.max_batch_size)?;
        self.append(collection, entries).await?;
        store.insert(entries);
        Ok(())
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
