//! Chunk representation.
//!
//! Chunks are bounded contiguous slices of the original document produced by
//! the semantic chunker. Each chunk keeps its position within the source text
//! and the token estimate that admitted it.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A bounded contiguous slice of a document.
///
/// # Examples
///
/// ```
/// use chunkwise::core::Chunk;
///
/// let chunk = Chunk::new(0, "Hello, world!".to_string(), 0..13, 4);
/// assert_eq!(chunk.size(), 13);
/// assert!(!chunk.has_overlap);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential index within the document (0-based).
    pub index: usize,

    /// Chunk content, exactly `source[byte_range]`.
    pub text: String,

    /// Byte range in the original document.
    pub byte_range: Range<usize>,

    /// Token estimate for `text` under the chunking model.
    pub estimated_tokens: usize,

    /// Section the chunk starts in, when section markers are configured.
    pub section_label: Option<String>,

    /// Whether this chunk re-includes the tail of the previous chunk.
    pub has_overlap: bool,
}

impl Chunk {
    /// Creates a new chunk without section or overlap metadata.
    #[must_use]
    pub const fn new(
        index: usize,
        text: String,
        byte_range: Range<usize>,
        estimated_tokens: usize,
    ) -> Self {
        Self {
            index,
            text,
            byte_range,
            estimated_tokens,
            section_label: None,
            has_overlap: false,
        }
    }

    /// Creates the single chunk covering a whole document.
    #[must_use]
    pub fn whole(text: &str, estimated_tokens: usize) -> Self {
        Self::new(0, text.to_string(), 0..text.len(), estimated_tokens)
    }

    /// Sets the section label.
    #[must_use]
    pub fn with_section(mut self, label: Option<String>) -> Self {
        self.section_label = label;
        self
    }

    /// Marks this chunk as overlapping the previous one.
    #[must_use]
    pub const fn with_overlap(mut self, has_overlap: bool) -> Self {
        self.has_overlap = has_overlap;
        self
    }

    /// Returns the size of the chunk in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text.len()
    }

    /// Checks if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns the start byte offset in the original document.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.byte_range.start
    }

    /// Returns the end byte offset in the original document.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.byte_range.end
    }

    /// Checks if this chunk's byte range overlaps with another range.
    #[must_use]
    pub const fn overlaps_with(&self, other_range: &Range<usize>) -> bool {
        self.byte_range.start < other_range.end && other_range.start < self.byte_range.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new() {
        let chunk = Chunk::new(2, "Hello".to_string(), 10..15, 1);
        assert_eq!(chunk.index, 2);
        assert_eq!(chunk.text, "Hello");
        assert_eq!(chunk.start(), 10);
        assert_eq!(chunk.end(), 15);
        assert!(chunk.section_label.is_none());
    }

    #[test]
    fn test_chunk_whole() {
        let chunk = Chunk::whole("full text", 2);
        assert_eq!(chunk.index, 0);
        assert_eq!(chunk.byte_range, 0..9);
        assert_eq!(chunk.estimated_tokens, 2);
    }

    #[test]
    fn test_chunk_builders() {
        let chunk = Chunk::new(1, "x".to_string(), 0..1, 1)
            .with_section(Some("VOTE".to_string()))
            .with_overlap(true);
        assert_eq!(chunk.section_label.as_deref(), Some("VOTE"));
        assert!(chunk.has_overlap);
    }

    #[test]
    fn test_chunk_overlaps_with() {
        let chunk = Chunk::new(0, "test".to_string(), 10..20, 1);
        assert!(chunk.overlaps_with(&(15..25)));
        assert!(chunk.overlaps_with(&(5..15)));
        assert!(!chunk.overlaps_with(&(20..30)));
        assert!(!chunk.overlaps_with(&(0..10)));
    }

    #[test]
    fn test_chunk_serialization() {
        let chunk = Chunk::new(0, "test".to_string(), 0..4, 1);
        let json = serde_json::to_string(&chunk).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_chunk_empty() {
        let chunk = Chunk::new(0, String::new(), 0..0, 0);
        assert!(chunk.is_empty());
        assert_eq!(chunk.size(), 0);
    }
}
