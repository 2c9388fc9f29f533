//! # dx-rag
//!
//! Retrieval over clinical protocols: corpus loading, fixed-size chunking,
//! embedding, persistent vector storage, batched index builds and top-K
//! nearest-neighbour queries.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dx_rag::{corpus, CorpusSource, FileVectorStore, HashingEmbedder, Indexer, RagConfig,
//!     RebuildMode, Retriever};
//!
//! let store = Arc::new(FileVectorStore::open("data/index").await?);
//! let embedder = Arc::new(HashingEmbedder::default());
//! let records = corpus::load(&CorpusSource::directory("data/corpus"))?;
//!
//! let indexer = Indexer::new(RagConfig::default(), embedder.clone(), store.clone())?;
//! indexer.build(&records, RebuildMode::Recreate).await?;
//!
//! let retriever = Retriever::open(store, embedder, "protocols").await?;
//! let hits = retriever.query("fever, stiff neck", 3).await?;
//! ```

pub mod chunking;
pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod indexer;
pub mod inmemory;
#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "openai")]
pub mod openai;
pub mod retriever;
pub mod vectorstore;

pub use chunking::{Chunker, FixedSizeChunker, chunk_text};
pub use config::{DEFAULT_COLLECTION, RagConfig, RagConfigBuilder, validate_collection_name};
pub use corpus::{CorpusFormat, CorpusSource};
pub use document::{
    Chunk, ChunkMetadata, CollectionInfo, IndexEntry, Metadata, MetadataValue, ProtocolRecord,
    SearchResult,
};
pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use error::{RagError, Result};
pub use filestore::FileVectorStore;
pub use indexer::{Indexer, RebuildMode};
pub use inmemory::InMemoryVectorStore;
#[cfg(feature = "local")]
pub use local::MiniLmEmbedder;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use retriever::{RetrievalResult, Retriever};
pub use vectorstore::{VectorStore, cosine_distance};
