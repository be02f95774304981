//! Map-phase audit.

use crate::chunking::{ChunkingReason, CoverageEntry, CoverageReport};
use serde::Serialize;

/// Coverage and usage audit of one map phase, for logging and
/// observability pipelines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkingAudit {
    /// Whether the document was split.
    pub applied: bool,
    /// Why it was or was not split.
    pub reason: ChunkingReason,
    /// Model the document was estimated and dispatched for.
    pub model: String,
    /// Number of chunks dispatched.
    pub chunk_count: usize,
    /// Chunks whose handler succeeded.
    pub chunks_succeeded: usize,
    /// Chunks whose handler failed.
    pub chunks_failed: usize,
    /// Indices of the failed chunks.
    pub failed_chunks: Vec<usize>,
    /// Fraction of characters covered by the chunks.
    pub coverage_ratio_chars: f64,
    /// Fraction of tokens covered by the chunks, overlaps counted once.
    pub coverage_ratio_tokens: f64,
    /// Per-chunk coverage entries.
    pub coverage_map: Vec<CoverageEntry>,
    /// Minimum coverage the stage accepts.
    pub min_coverage_ratio: f64,
    /// Whether both coverage ratios reached the minimum.
    pub coverage_gate_passed: bool,
    /// Token estimate of the whole document.
    pub total_tokens: usize,
    /// Character count of the whole document.
    pub total_chars: usize,
    /// Total context budget of the stage.
    pub max_tokens: usize,
    /// Per-chunk budget after fixed context and response reserve.
    pub effective_max_tokens: usize,
    /// Tokens of fixed surrounding context sent with every chunk.
    pub fixed_context_tokens: usize,
    /// Configured overlap.
    pub overlap_tokens: usize,
    /// Worker pool size.
    pub workers: usize,
}

impl ChunkingAudit {
    /// Starts an audit from a coverage report; dispatch counters start at
    /// zero.
    #[must_use]
    pub fn from_coverage(coverage: CoverageReport, model: &str, min_coverage_ratio: f64) -> Self {
        let coverage_gate_passed = coverage.meets(min_coverage_ratio);
        Self {
            applied: coverage.applied,
            reason: coverage.reason,
            model: model.to_string(),
            chunk_count: coverage.chunk_count,
            chunks_succeeded: 0,
            chunks_failed: 0,
            failed_chunks: Vec::new(),
            coverage_ratio_chars: coverage.coverage_ratio_chars,
            coverage_ratio_tokens: coverage.coverage_ratio_tokens,
            coverage_map: coverage.coverage_map,
            min_coverage_ratio,
            coverage_gate_passed,
            total_tokens: coverage.total_tokens,
            total_chars: coverage.total_chars,
            max_tokens: coverage.max_tokens,
            effective_max_tokens: coverage.max_tokens,
            fixed_context_tokens: 0,
            overlap_tokens: coverage.overlap_tokens,
            workers: 0,
        }
    }

    /// Serializes the audit as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if serialization fails.
    pub fn to_json(&self) -> crate::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}
