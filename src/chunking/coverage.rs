//! Coverage audit.
//!
//! Records where each chunk sits in the source document and how much of the
//! document the chunk set reconstructs, counting overlapped regions once.

use crate::core::Chunk;
use crate::io::CharCursor;
use crate::tokens::TokenEstimator;
use serde::{Deserialize, Serialize};

/// Why a document was or was not split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingReason {
    /// Empty input; nothing to process.
    EmptyInput,
    /// The whole document fits the budget.
    FitsSingleContext,
    /// The document exceeded the budget and was split.
    ContextExceeded,
    /// No paragraph units could be built; the document is kept whole.
    NoSplittableUnits,
    /// Chunking is switched off in configuration.
    ChunkingDisabled,
}

/// Position and overlap of one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEntry {
    /// Chunk index (0-based).
    pub chunk_index: usize,
    /// First character offset (inclusive).
    pub char_start: usize,
    /// Last character offset (exclusive).
    pub char_end: usize,
    /// Token estimate of the chunk.
    pub estimated_tokens: usize,
    /// Tokens re-included from the previous chunk.
    pub overlap_prev_tokens: usize,
    /// Characters re-included from the previous chunk.
    pub overlap_prev_chars: usize,
    /// Sections touched by the chunk, in document order.
    pub sections: Vec<String>,
}

/// Aggregate coverage of a chunk set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Whether the document was split.
    pub applied: bool,
    /// Why it was or was not split.
    pub reason: ChunkingReason,
    /// Token budget per chunk.
    pub max_tokens: usize,
    /// Configured overlap.
    pub overlap_tokens: usize,
    /// Token estimate of the whole document.
    pub total_tokens: usize,
    /// Character count of the whole document.
    pub total_chars: usize,
    /// Number of chunks.
    pub chunk_count: usize,
    /// Fraction of characters covered by at least one chunk.
    pub coverage_ratio_chars: f64,
    /// Fraction of tokens reconstructed, overlaps counted once.
    pub coverage_ratio_tokens: f64,
    /// One entry per chunk.
    pub coverage_map: Vec<CoverageEntry>,
}

impl CoverageReport {
    /// Report for a document kept whole (or empty).
    #[must_use]
    pub fn unsplit(
        reason: ChunkingReason,
        chunks: &[Chunk],
        total_tokens: usize,
        total_chars: usize,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Self {
        let coverage_map = chunks
            .iter()
            .map(|chunk| CoverageEntry {
                chunk_index: chunk.index,
                char_start: 0,
                char_end: total_chars,
                estimated_tokens: chunk.estimated_tokens,
                overlap_prev_tokens: 0,
                overlap_prev_chars: 0,
                sections: chunk.section_label.iter().cloned().collect(),
            })
            .collect();
        Self {
            applied: false,
            reason,
            max_tokens,
            overlap_tokens,
            total_tokens,
            total_chars,
            chunk_count: chunks.len(),
            coverage_ratio_chars: 1.0,
            coverage_ratio_tokens: 1.0,
            coverage_map,
        }
    }

    /// Returns true when both ratios reach `min_ratio`.
    #[must_use]
    pub fn meets(&self, min_ratio: f64) -> bool {
        self.coverage_ratio_chars >= min_ratio && self.coverage_ratio_tokens >= min_ratio
    }
}

/// Builds the coverage report for a split document.
///
/// `sections` holds, per chunk, the ordered distinct sections it touches.
#[allow(clippy::too_many_arguments)]
pub fn measure(
    text: &str,
    model: &str,
    chunks: &[Chunk],
    sections: Vec<Vec<String>>,
    estimator: TokenEstimator,
    total_tokens: usize,
    max_tokens: usize,
    overlap_tokens: usize,
) -> CoverageReport {
    let total_chars = text.chars().count();
    let mut starts = CharCursor::new(text);
    let mut ends = CharCursor::new(text);

    let mut coverage_map = Vec::with_capacity(chunks.len());
    let mut covered_chars = 0usize;
    let mut reconstructed_tokens = 0usize;
    let mut prev_end_byte = 0usize;
    let mut prev_end_char = 0usize;

    for (chunk, sections) in chunks.iter().zip(sections) {
        let char_start = starts.char_offset(chunk.start());
        let char_end = ends.char_offset(chunk.end());

        let (overlap_prev_chars, overlap_prev_tokens) =
            if chunk.index > 0 && chunk.start() < prev_end_byte {
                let overlap_end = prev_end_byte.min(chunk.end());
                (
                    prev_end_char.min(char_end) - char_start,
                    estimator.estimate(&text[chunk.start()..overlap_end], model),
                )
            } else {
                (0, 0)
            };

        covered_chars += char_end - char_start - overlap_prev_chars;
        reconstructed_tokens += chunk.estimated_tokens.saturating_sub(overlap_prev_tokens);

        coverage_map.push(CoverageEntry {
            chunk_index: chunk.index,
            char_start,
            char_end,
            estimated_tokens: chunk.estimated_tokens,
            overlap_prev_tokens,
            overlap_prev_chars,
            sections,
        });
        prev_end_byte = prev_end_byte.max(chunk.end());
        prev_end_char = prev_end_char.max(char_end);
    }

    CoverageReport {
        applied: true,
        reason: ChunkingReason::ContextExceeded,
        max_tokens,
        overlap_tokens,
        total_tokens,
        total_chars,
        chunk_count: chunks.len(),
        coverage_ratio_chars: ratio(covered_chars, total_chars),
        coverage_ratio_tokens: ratio(reconstructed_tokens, total_tokens),
        coverage_map,
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 1.0;
    }
    (part as f64 / whole as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TokenEstimator {
        TokenEstimator::new().unwrap()
    }

    fn chunk_at(text: &str, index: usize, range: std::ops::Range<usize>) -> Chunk {
        let est = estimator();
        let tokens = est.estimate(&text[range.clone()], "gpt-4o");
        Chunk::new(index, text[range.clone()].to_string(), range, tokens)
    }

    #[test]
    fn test_measure_disjoint_chunks() {
        let text = "alpha beta\n\ngamma delta";
        let chunks = vec![chunk_at(text, 0, 0..10), chunk_at(text, 1, 12..23)];
        let total = estimator().estimate(text, "gpt-4o");
        let report = measure(text, "gpt-4o", &chunks, vec![vec![], vec![]], estimator(), total, 10, 0);

        assert!(report.applied);
        assert_eq!(report.chunk_count, 2);
        assert_eq!(report.coverage_map[1].char_start, 12);
        assert_eq!(report.coverage_map[1].overlap_prev_chars, 0);
        // Only the blank line is uncovered
        assert!((report.coverage_ratio_chars - 21.0 / 23.0).abs() < 1e-9);
    }

    #[test]
    fn test_measure_overlap_counted_once() {
        let text = "one two three four five six";
        let chunks = vec![chunk_at(text, 0, 0..18), chunk_at(text, 1, 8..27)];
        let total = estimator().estimate(text, "gpt-4o");
        let report = measure(text, "gpt-4o", &chunks, vec![vec![], vec![]], estimator(), total, 10, 3);

        let second = &report.coverage_map[1];
        assert_eq!(second.overlap_prev_chars, 10);
        assert!(second.overlap_prev_tokens > 0);
        assert!((report.coverage_ratio_chars - 1.0).abs() < 1e-9);
        assert!(report.coverage_ratio_tokens <= 1.0);
    }

    #[test]
    fn test_measure_multibyte_offsets() {
        let text = "ação é boa\n\nsim";
        let chunks = vec![chunk_at(text, 0, 0..13), chunk_at(text, 1, 15..18)];
        let report = measure(text, "gpt-4o", &chunks, vec![vec![], vec![]], estimator(), 6, 10, 0);
        assert_eq!(report.total_chars, 15);
        assert_eq!(report.coverage_map[0].char_end, 10);
        assert_eq!(report.coverage_map[1].char_start, 12);
    }

    #[test]
    fn test_unsplit_report() {
        let chunk = Chunk::whole("short", 1);
        let report = CoverageReport::unsplit(
            ChunkingReason::FitsSingleContext,
            std::slice::from_ref(&chunk),
            1,
            5,
            100,
            10,
        );
        assert!(!report.applied);
        assert_eq!(report.chunk_count, 1);
        assert_eq!(report.coverage_map[0].char_end, 5);
        assert!(report.meets(0.95));
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ChunkingReason::FitsSingleContext).unwrap();
        assert_eq!(json, "\"fits_single_context\"");
    }
}
