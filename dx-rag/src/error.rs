//! Error types for the `dx-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading, indexing, or retrieving protocols.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error (chunk sizes, `top_k`, batch size).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The corpus directory or file does not exist.
    #[error("Corpus not found: {}", path.display())]
    CorpusNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A corpus file (or line of a JSON lines file) could not be decoded.
    #[error("Corpus parse error in {} (line {line:?}): {message}", path.display())]
    CorpusParseError {
        /// The file being parsed.
        path: PathBuf,
        /// One-based line number for JSON lines corpora.
        line: Option<usize>,
        /// A description of the failure.
        message: String,
    },

    /// The requested collection does not exist in the vector store.
    #[error("Index unavailable: collection '{collection}' does not exist")]
    IndexUnavailable {
        /// The missing collection.
        collection: String,
    },

    /// The collection was built with a different embedding function than the one
    /// used to query it.
    #[error(
        "Embedding mismatch for collection '{collection}': indexed with {indexed}, queried with {query}"
    )]
    EmbeddingMismatch {
        /// The collection being opened.
        collection: String,
        /// Embedder signature stored with the collection.
        indexed: String,
        /// Embedder signature of the query-time provider.
        query: String,
    },

    /// An entry ID is already present in the collection (or repeated in one write).
    #[error("Duplicate entry id '{id}' in collection '{collection}'")]
    DuplicateId {
        /// The collection being written.
        collection: String,
        /// The colliding entry ID.
        id: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An I/O error while reading the corpus or persisting the index.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
