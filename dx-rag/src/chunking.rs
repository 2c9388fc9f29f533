//! Fixed-size, overlapping text chunking.
//!
//! Lengths are counted in `char`s rather than bytes: protocol texts are mostly
//! Cyrillic, and a byte window would split multi-byte characters.

use crate::document::{Chunk, ChunkMetadata, ProtocolRecord};
use crate::error::{RagError, Result};

/// Split `text` into windows of at most `size` characters, advancing by
/// `size - overlap` characters each step.
///
/// Windows start at `0, step, 2 * step, ...` while the start lies inside the
/// text, so the final window may be shorter than `size`. Empty input yields no
/// windows.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] unless `size > overlap`.
///
/// # Example
///
/// ```rust
/// let chunks = dx_rag::chunk_text(&"A".repeat(1200), 500, 50).unwrap();
/// let lens: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
/// assert_eq!(lens, vec![500, 500, 300]);
/// ```
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    check_window(size, overlap)?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, plus the end of the string.
    let boundaries: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_len = boundaries.len() - 1;
    let step = size - overlap;

    let mut chunks = Vec::with_capacity(char_len.div_ceil(step));
    let mut start = 0;
    while start < char_len {
        let end = (start + size).min(char_len);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        start += step;
    }
    Ok(chunks)
}

pub(crate) fn check_window(size: usize, overlap: usize) -> Result<()> {
    if overlap >= size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({overlap}) must be less than chunk_size ({size})"
        )));
    }
    Ok(())
}

/// A strategy for splitting protocol records into chunks.
pub trait Chunker: Send + Sync {
    /// Split a record into chunks. Returns an empty `Vec` for empty text.
    fn chunk(&self, record: &ProtocolRecord) -> Vec<Chunk>;
}

/// Splits records into fixed-size windows with configurable overlap.
///
/// Chunk IDs are `{protocol_id}_chunk_{n}`, and every chunk carries the
/// record's [`ChunkMetadata`].
///
/// # Example
///
/// ```rust,ignore
/// use dx_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(500, 50)?;
/// let chunks = chunker.chunk(&record);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `chunk_size > chunk_overlap`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        check_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, record: &ProtocolRecord) -> Vec<Chunk> {
        // Sizes were validated in `new`.
        let windows = chunk_text(&record.text, self.chunk_size, self.chunk_overlap)
            .unwrap_or_default();
        let metadata = ChunkMetadata::for_record(record);

        windows
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                id: Chunk::chunk_id(&record.id, i),
                text,
                metadata: metadata.clone(),
            })
            .collect()
    }
}
