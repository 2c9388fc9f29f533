//! Configuration for indexing and retrieval.

use serde::{Deserialize, Serialize};

use crate::chunking;
use crate::error::{RagError, Result};

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "protocols";

/// Configuration parameters for the index build and query paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of nearest chunks to retrieve per query.
    pub top_k: usize,
    /// Maximum number of entries submitted to the vector store in one write.
    pub batch_size: usize,
    /// Name of the collection holding the protocol chunks.
    pub collection: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 2,
            batch_size: 5000,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks to retrieve per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum write batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Build the [`RagConfig`].
    ///
    /// # Errors
    ///
    /// [`RagError::ConfigError`] when the overlap is not below the chunk size,
    /// `top_k` or `batch_size` is zero, or the collection name is not a plain
    /// identifier (see [`validate_collection_name`]).
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        chunking::check_window(config.chunk_size, config.chunk_overlap)?;
        for (field, value) in [("top_k", config.top_k), ("batch_size", config.batch_size)] {
            if value == 0 {
                return Err(RagError::ConfigError(format!("{field} must be at least 1")));
            }
        }
        validate_collection_name(&config.collection)?;
        Ok(config)
    }
}

/// Collection names double as file stems, so only ASCII letters, digits,
/// `_` and `-` are allowed.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let valid =
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RagError::ConfigError(format!(
            "collection name '{name}' may only contain ASCII letters, digits, '_' and '-'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_build() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.collection, "protocols");
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn rejects_zero_top_k_and_batch() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().batch_size(0).build().is_err());
        assert!(RagConfig::builder().collection("  ").build().is_err());
        assert!(RagConfig::builder().collection("a/b").build().is_err());
    }
}
