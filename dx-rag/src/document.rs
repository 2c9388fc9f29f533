//! Data types for protocol records, chunks, index entries, and search results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A clinical protocol as loaded from the corpus.
///
/// Records are produced by the corpus loader and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolRecord {
    /// Unique identifier for the protocol.
    pub id: String,
    /// Optional human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The protocol body text.
    pub text: String,
    /// Diagnosis codes the protocol covers, in source order.
    pub codes: Vec<String>,
    /// Raw ground-truth label carried by JSON lines corpora.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,
}

/// A primitive metadata value.
///
/// Vector stores only accept primitive metadata, so structured fields must be
/// encoded before they reach an [`IndexEntry`]. See [`ChunkMetadata`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetadataValue {
    /// Return the contained string, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Primitive-only metadata map as stored in the vector index.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata attached to every chunk of a protocol.
///
/// Stored schema (all values are strings):
///
/// | key           | value                                        |
/// |---------------|----------------------------------------------|
/// | `protocol_id` | the parent [`ProtocolRecord::id`]            |
/// | `title`       | the protocol title, empty when absent        |
/// | `icd_codes`   | JSON array of codes, e.g. `["J11.1","J10"]`  |
/// | `gt`          | ground-truth label, omitted when absent      |
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub protocol_id: String,
    pub title: String,
    pub icd_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<String>,
}

impl ChunkMetadata {
    pub const PROTOCOL_ID: &'static str = "protocol_id";
    pub const TITLE: &'static str = "title";
    pub const ICD_CODES: &'static str = "icd_codes";
    pub const GROUND_TRUTH: &'static str = "gt";

    /// Build chunk metadata from the parent record.
    pub fn for_record(record: &ProtocolRecord) -> Self {
        Self {
            protocol_id: record.id.clone(),
            title: record.title.clone().unwrap_or_default(),
            icd_codes: record.codes.clone(),
            ground_truth: record.ground_truth.clone(),
        }
    }

    /// Encode into a primitive-only map. The code list becomes a JSON string.
    pub fn to_metadata(&self) -> Metadata {
        let mut map = Metadata::new();
        map.insert(Self::PROTOCOL_ID.to_string(), self.protocol_id.as_str().into());
        map.insert(Self::TITLE.to_string(), self.title.as_str().into());
        // Serializing a Vec<String> cannot fail.
        let codes = serde_json::to_string(&self.icd_codes).unwrap_or_else(|_| "[]".to_string());
        map.insert(Self::ICD_CODES.to_string(), codes.into());
        if let Some(gt) = &self.ground_truth {
            map.insert(Self::GROUND_TRUTH.to_string(), gt.as_str().into());
        }
        map
    }

    /// Decode from a stored map. Missing keys fall back to empty values and an
    /// undecodable `icd_codes` string yields an empty code list.
    pub fn from_metadata(map: &Metadata) -> Self {
        let text = |key: &str| map.get(key).map(ToString::to_string);
        let icd_codes = map
            .get(Self::ICD_CODES)
            .and_then(MetadataValue::as_str)
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default();
        Self {
            protocol_id: text(Self::PROTOCOL_ID).unwrap_or_default(),
            title: text(Self::TITLE).unwrap_or_default(),
            icd_codes,
            ground_truth: text(Self::GROUND_TRUTH),
        }
    }
}

/// A window of a [`ProtocolRecord`]'s text, the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{protocol_id}_chunk_{n}`.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Metadata inherited from the parent record.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Format the ID of the `index`-th chunk of a protocol.
    pub fn chunk_id(protocol_id: &str, index: usize) -> String {
        format!("{protocol_id}_chunk_{index}")
    }
}

/// A persisted vector index entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Unique ID within the collection.
    pub id: String,
    /// The embedding vector.
    pub embedding: Vec<f32>,
    /// The document text.
    pub document: String,
    /// Primitive-only metadata.
    pub metadata: Metadata,
}

impl IndexEntry {
    /// Build an entry from a chunk and its embedding.
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            embedding,
            document: chunk.text.clone(),
            metadata: chunk.metadata.to_metadata(),
        }
    }
}

/// A retrieved entry paired with its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The entry ID.
    pub id: String,
    /// The document text.
    pub document: String,
    /// The stored metadata.
    pub metadata: Metadata,
    /// Cosine distance to the query (lower is nearer).
    pub distance: f32,
}

impl SearchResult {
    /// Decode the stored metadata into [`ChunkMetadata`].
    pub fn chunk_metadata(&self) -> ChunkMetadata {
        ChunkMetadata::from_metadata(&self.metadata)
    }
}

/// Per-collection facts recorded at build time.
///
/// `embedder` identifies the embedding function; querying a collection with a
/// different function yields meaningless neighbours, so retrievers compare it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Dimensionality of every stored embedding.
    pub dimensions: usize,
    /// Signature of the embedding function, e.g. `hashing-v1`.
    pub embedder: String,
}

impl CollectionInfo {
    /// Human-readable signature combining embedder name and dimensions.
    pub fn signature(&self) -> String {
        format!("{}/{}", self.embedder, self.dimensions)
    }
}
