//! Index build and retrieval over the in-memory and file-backed stores.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dx_rag::{
    CollectionInfo, EmbeddingProvider, FileVectorStore, HashingEmbedder, InMemoryVectorStore,
    IndexEntry, Indexer, ProtocolRecord, RagConfig, RagError, RebuildMode, Retriever,
    SearchResult, VectorStore,
};

fn record(id: &str, text: &str, codes: &[&str]) -> ProtocolRecord {
    ProtocolRecord {
        id: id.into(),
        title: Some(format!("Protocol {id}")),
        text: text.into(),
        codes: codes.iter().map(|c| c.to_string()).collect(),
        ground_truth: None,
    }
}

fn corpus() -> Vec<ProtocolRecord> {
    vec![
        record(
            "flu",
            "Influenza: abrupt fever, dry cough, headache, myalgia and sore throat during winter season.",
            &["J11.1"],
        ),
        record(
            "meningitis",
            "Bacterial meningitis: high fever, stiff neck, photophobia, altered mental status.",
            &["G00.9"],
        ),
        record(
            "fracture",
            "Distal radius fracture after a fall on an outstretched hand, wrist deformity and swelling.",
            &["S52.5"],
        ),
    ]
}

/// Records the size of every write so tests can check batching. Writes after
/// the first `fail_after` succeed are rejected.
struct RecordingStore {
    inner: InMemoryVectorStore,
    batches: Mutex<Vec<usize>>,
    fail_after: Option<usize>,
}

impl RecordingStore {
    fn new(max_batch_size: usize) -> Self {
        Self {
            inner: InMemoryVectorStore::new().with_max_batch_size(max_batch_size),
            batches: Mutex::new(Vec::new()),
            fail_after: None,
        }
    }

    fn failing_after(max_batch_size: usize, writes: usize) -> Self {
        Self { fail_after: Some(writes), ..Self::new(max_batch_size) }
    }
}

/// Hashing embedder whose batch calls fail from the `fail_from`-th call on.
struct FlakyEmbedder {
    inner: HashingEmbedder,
    calls: Mutex<usize>,
    fail_from: usize,
}

impl FlakyEmbedder {
    fn new(fail_from: usize) -> Self {
        Self { inner: HashingEmbedder::default(), calls: Mutex::new(0), fail_from }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> dx_rag::Result<Vec<f32>> {
        self.inner.embed(text).await
    }
    async fn embed_batch(&self, texts: &[&str]) -> dx_rag::Result<Vec<Vec<f32>>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call >= self.fail_from {
            return Err(RagError::EmbeddingError {
                provider: "flaky".into(),
                message: "backend went away".into(),
            });
        }
        self.inner.embed_batch(texts).await
    }
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn create_collection(&self, name: &str, info: &CollectionInfo) -> dx_rag::Result<()> {
        self.inner.create_collection(name, info).await
    }
    async fn delete_collection(&self, name: &str) -> dx_rag::Result<()> {
        self.inner.delete_collection(name).await
    }
    async fn collection_info(&self, name: &str) -> dx_rag::Result<Option<CollectionInfo>> {
        self.inner.collection_info(name).await
    }
    async fn list_collections(&self) -> dx_rag::Result<Vec<String>> {
        self.inner.list_collections().await
    }
    async fn count(&self, collection: &str) -> dx_rag::Result<usize> {
        self.inner.count(collection).await
    }
    async fn add(&self, collection: &str, entries: &[IndexEntry]) -> dx_rag::Result<()> {
        {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_after.is_some_and(|n| batches.len() >= n) {
                return Err(RagError::VectorStoreError {
                    backend: "recording".into(),
                    message: "disk full".into(),
                });
            }
            batches.push(entries.len());
        }
        self.inner.add(collection, entries).await
    }
    async fn peek(&self, collection: &str, limit: usize) -> dx_rag::Result<Vec<SearchResult>> {
        self.inner.peek(collection, limit).await
    }
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> dx_rag::Result<Vec<SearchResult>> {
        self.inner.search(collection, embedding, top_k).await
    }
    fn max_batch_size(&self) -> usize {
        self.inner.max_batch_size()
    }
}

fn config() -> RagConfig {
    RagConfig::builder().chunk_size(500).chunk_overlap(50).build().unwrap()
}

#[tokio::test]
async fn reference_scenario_writes_three_entries() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::new(64));
    let indexer = Indexer::new(config(), embedder.clone(), store.clone()).unwrap();

    let written =
        indexer.build(&[record("P1", &"A".repeat(1200), &["A00"])], RebuildMode::Recreate).await.unwrap();
    assert_eq!(written, 3);

    let entries = store.peek("protocols", 10).await.unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["P1_chunk_0", "P1_chunk_1", "P1_chunk_2"]);

    let meta = entries[0].chunk_metadata();
    assert_eq!(meta.protocol_id, "P1");
    assert_eq!(meta.icd_codes, vec!["A00".to_string()]);
}

#[tokio::test]
async fn writes_never_exceed_the_batch_limit() {
    let store = Arc::new(RecordingStore::new(4));
    let embedder = Arc::new(HashingEmbedder::new(32));
    let config = RagConfig::builder().chunk_size(20).chunk_overlap(5).batch_size(100).build().unwrap();
    let indexer = Indexer::new(config, embedder, store.clone()).unwrap();
    assert_eq!(indexer.batch_size(), 4);

    let written = indexer.build(&corpus(), RebuildMode::Recreate).await.unwrap();
    let batches = store.batches.lock().unwrap().clone();

    assert!(batches.iter().all(|b| *b <= 4));
    assert_eq!(batches.iter().sum::<usize>(), written);
    assert_eq!(store.count("protocols").await.unwrap(), written);
}

#[tokio::test]
async fn recreate_is_idempotent() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = Indexer::new(config(), embedder, store.clone()).unwrap();

    let first = indexer.build(&corpus(), RebuildMode::Recreate).await.unwrap();
    let second = indexer.build(&corpus(), RebuildMode::Recreate).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.count("protocols").await.unwrap(), second);
}

#[tokio::test]
async fn append_rejects_colliding_ids_without_writing() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = Indexer::new(config(), embedder, store.clone()).unwrap();

    let written = indexer.build(&corpus(), RebuildMode::Append).await.unwrap();
    let extra = [record("asthma", "Wheezing and shortness of breath.", &["J45.9"])];
    assert_eq!(indexer.build(&extra, RebuildMode::Append).await.unwrap(), 1);

    let err = indexer.build(&corpus(), RebuildMode::Append).await.unwrap_err();
    assert!(matches!(err, RagError::DuplicateId { .. }));
    assert_eq!(store.count("protocols").await.unwrap(), written + 1);
}

#[tokio::test]
async fn duplicate_record_ids_fail_before_touching_the_index() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    let indexer = Indexer::new(config(), embedder, store.clone()).unwrap();
    let written = indexer.build(&corpus(), RebuildMode::Recreate).await.unwrap();

    let clash = [record("dup", "one", &[]), record("dup", "two", &[])];
    let err = indexer.build(&clash, RebuildMode::Recreate).await.unwrap_err();
    assert!(matches!(err, RagError::DuplicateId { ref id, .. } if id == "dup_chunk_0"));
    // The previous index is left intact.
    assert_eq!(store.count("protocols").await.unwrap(), written);
}

fn six_records() -> Vec<ProtocolRecord> {
    (0..6).map(|i| record(&format!("P{i}"), &format!("protocol number {i} text"), &[])).collect()
}

#[tokio::test]
async fn failed_embedding_leaves_previous_index_intact() {
    let store = Arc::new(RecordingStore::new(2));
    let config = RagConfig::builder().batch_size(2).build().unwrap();
    let full = Indexer::new(config.clone(), Arc::new(HashingEmbedder::default()), store.clone())
        .unwrap()
        .build(&six_records(), RebuildMode::Recreate)
        .await
        .unwrap();
    assert_eq!(full, 6);

    let flaky = Arc::new(FlakyEmbedder::new(2));
    let err = Indexer::new(config, flaky.clone(), store.clone())
        .unwrap()
        .build(&six_records(), RebuildMode::Recreate)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingError { .. }));

    assert_eq!(store.count("protocols").await.unwrap(), 6);
    let retriever = Retriever::open(store, flaky, "protocols").await.unwrap();
    assert_eq!(retriever.query("protocol number 4", 6).await.unwrap().len(), 6);
}

#[tokio::test]
async fn failed_write_during_recreate_leaves_no_queryable_index() {
    let embedder = Arc::new(HashingEmbedder::default());
    let store = Arc::new(RecordingStore::failing_after(2, 1));
    let config = RagConfig::builder().batch_size(2).build().unwrap();

    let err = Indexer::new(config, embedder.clone(), store.clone())
        .unwrap()
        .build(&six_records(), RebuildMode::Recreate)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { .. }));

    assert_eq!(store.collection_info("protocols").await.unwrap(), None);
    assert!(matches!(
        Retriever::open(store, embedder, "protocols").await,
        Err(RagError::IndexUnavailable { .. })
    ));
}

#[tokio::test]
async fn self_retrieval_returns_own_chunk_first() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    Indexer::new(config(), embedder.clone(), store.clone())
        .unwrap()
        .build(&corpus(), RebuildMode::Recreate)
        .await
        .unwrap();

    let retriever = Retriever::open(store, embedder, "protocols").await.unwrap();
    for protocol in corpus() {
        let results = retriever.query(&protocol.text, 3).await.unwrap();
        assert_eq!(results[0].id, format!("{}_chunk_0", protocol.id));
        assert!(results[0].distance.abs() < 1e-5);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    let results = retriever.query("high fever and a stiff neck", 1).await.unwrap();
    assert_eq!(results[0].chunk_metadata().icd_codes, vec!["G00.9".to_string()]);
}

#[tokio::test]
async fn k_larger_than_index_returns_what_exists() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    Indexer::new(config(), embedder.clone(), store.clone())
        .unwrap()
        .build(&[record("only", "single short protocol", &[])], RebuildMode::Recreate)
        .await
        .unwrap();

    let retriever = Retriever::open(store, embedder, "protocols").await.unwrap();
    assert_eq!(retriever.query("protocol", 3).await.unwrap().len(), 1);
    assert!(matches!(retriever.query("protocol", 0).await, Err(RagError::ConfigError(_))));
}

#[tokio::test]
async fn empty_index_returns_empty_result() {
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder = Arc::new(HashingEmbedder::default());
    let written = Indexer::new(config(), embedder.clone(), store.clone())
        .unwrap()
        .build(&[], RebuildMode::Recreate)
        .await
        .unwrap();
    assert_eq!(written, 0);

    let retriever = Retriever::open(store, embedder, "protocols").await.unwrap();
    assert!(retriever.query("anything", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_collection_is_index_unavailable() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
    let err = Retriever::open(store, embedder, "protocols").await.unwrap_err();
    assert!(matches!(err, RagError::IndexUnavailable { ref collection } if collection == "protocols"));
}

#[tokio::test]
async fn mismatched_embedder_is_rejected() {
    let store = Arc::new(InMemoryVectorStore::new());
    Indexer::new(config(), Arc::new(HashingEmbedder::new(64)), store.clone())
        .unwrap()
        .build(&corpus(), RebuildMode::Recreate)
        .await
        .unwrap();

    let err = Retriever::open(store, Arc::new(HashingEmbedder::new(128)), "protocols")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::EmbeddingMismatch { .. }));
}

#[tokio::test]
async fn file_store_index_is_queryable_after_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let embedder = Arc::new(HashingEmbedder::default());
    {
        let store = Arc::new(FileVectorStore::open(temp.path()).await.unwrap());
        Indexer::new(config(), embedder.clone(), store)
            .unwrap()
            .build(&corpus(), RebuildMode::Recreate)
            .await
            .unwrap();
    }

    let store = Arc::new(FileVectorStore::open(temp.path()).await.unwrap());
    let retriever = Retriever::open(store, embedder, "protocols").await.unwrap();
    let results = retriever.query("wrist deformity after a fall", 1).await.unwrap();
    assert_eq!(results[0].chunk_metadata().protocol_id, "fracture");
}
