//! Semantic chunking.
//!
//! Splits documents that exceed a token budget into bounded, overlapping
//! chunks on paragraph boundaries:
//!
//! - **Units**: paragraph segmentation and hard splitting of oversized blocks
//! - **Semantic**: greedy packing with trailing-paragraph overlap
//! - **Sections**: optional structural header labels
//! - **Coverage**: audit of how much of the document the chunks reconstruct

pub mod coverage;
pub mod sections;
pub mod semantic;
pub mod units;

pub use coverage::{ChunkingReason, CoverageEntry, CoverageReport};
pub use sections::{PREAMBLE, Section, SectionMarkers};
pub use semantic::{ChunkPlan, SemanticChunker};

use crate::core::Chunk;
use crate::error::Result;
use crate::tokens::TokenEstimator;

/// Default token budget per chunk.
pub const DEFAULT_MAX_TOKENS: usize = 25_000;

/// Default overlap between consecutive chunks, in tokens.
pub const DEFAULT_OVERLAP_TOKENS: usize = 500;

/// Splits `text` into chunks of at most `max_tokens` under `model`'s
/// tokenizer, carrying about `overlap_tokens` of context between chunks.
///
/// # Errors
///
/// Returns a chunking error for a zero budget or an overlap that is not
/// smaller than the budget, and a tokenizer error if the BPE tables fail
/// to load.
pub fn chunk(text: &str, model: &str, max_tokens: usize, overlap_tokens: usize) -> Result<Vec<Chunk>> {
    let chunker = SemanticChunker::new(TokenEstimator::new()?, max_tokens, overlap_tokens)?;
    Ok(chunker.chunk(text, model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_small_text() {
        let chunks = chunk("Hello, world!", "gpt-4o", DEFAULT_MAX_TOKENS, DEFAULT_OVERLAP_TOKENS).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_chunk_rejects_bad_overlap() {
        assert!(chunk("text", "gpt-4o", 10, 10).is_err());
        assert!(chunk("text", "gpt-4o", 0, 0).is_err());
    }
}
