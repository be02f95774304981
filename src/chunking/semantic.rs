//! Semantic chunking strategy.
//!
//! Packs paragraph units greedily into chunks bounded by a token budget,
//! seeding each new chunk with a trailing window of the previous chunk's
//! paragraphs. Paragraphs that alone exceed the budget are hard-split first.

use crate::chunking::coverage::{self, ChunkingReason, CoverageReport};
use crate::chunking::sections::SectionMarkers;
use crate::chunking::units::{Unit, build_units};
use crate::core::Chunk;
use crate::error::{ChunkingError, Result};
use crate::tokens::TokenEstimator;
use std::ops::Range;
use tracing::{debug, info};

/// Chunks plus the coverage audit that describes them.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    /// Chunks in document order.
    pub chunks: Vec<Chunk>,
    /// Coverage audit.
    pub coverage: CoverageReport,
}

/// Semantic chunker that packs whole paragraphs under a token budget.
///
/// # Examples
///
/// ```
/// use chunkwise::chunking::SemanticChunker;
/// use chunkwise::tokens::TokenEstimator;
///
/// let chunker = SemanticChunker::new(TokenEstimator::new().unwrap(), 1_000, 100).unwrap();
/// let chunks = chunker.chunk("Hello, world! This is a test.", "gpt-4o");
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    estimator: TokenEstimator,
    /// Token budget per chunk.
    max_tokens: usize,
    /// Trailing context carried into the next chunk.
    overlap_tokens: usize,
    /// Optional section header recognizer.
    markers: Option<SectionMarkers>,
}

impl SemanticChunker {
    /// Creates a chunker.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] when `max_tokens` is zero and
    /// [`ChunkingError::OverlapTooLarge`] when `overlap_tokens >= max_tokens`.
    pub fn new(estimator: TokenEstimator, max_tokens: usize, overlap_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(ChunkingError::InvalidConfig {
                reason: "max_tokens must be > 0".to_string(),
            }
            .into());
        }
        if overlap_tokens >= max_tokens {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: overlap_tokens,
                max: max_tokens,
            }
            .into());
        }
        Ok(Self {
            estimator,
            max_tokens,
            overlap_tokens,
            markers: None,
        })
    }

    /// Tags chunks with the sections recognized by `markers`.
    #[must_use]
    pub fn with_sections(mut self, markers: SectionMarkers) -> Self {
        self.markers = Some(markers);
        self
    }

    /// Token budget per chunk.
    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Configured overlap in tokens.
    #[must_use]
    pub const fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Splits `text` into chunks.
    pub fn chunk(&self, text: &str, model: &str) -> Vec<Chunk> {
        self.chunk_with_coverage(text, model).chunks
    }

    /// Splits `text` into chunks and audits their coverage.
    pub fn chunk_with_coverage(&self, text: &str, model: &str) -> ChunkPlan {
        let total_tokens = self.estimator.estimate(text, model);
        let total_chars = text.chars().count();

        if text.is_empty() {
            return self.unsplit(ChunkingReason::EmptyInput, Vec::new(), 0, 0);
        }

        if total_tokens <= self.max_tokens {
            debug!(total_tokens, max_tokens = self.max_tokens, "text fits a single chunk");
            let chunk = Chunk::whole(text, total_tokens).with_section(self.leading_section(text));
            return self.unsplit(ChunkingReason::FitsSingleContext, vec![chunk], total_tokens, total_chars);
        }

        info!(
            total_tokens,
            max_tokens = self.max_tokens,
            overlap_tokens = self.overlap_tokens,
            "semantic chunking required"
        );

        let units = build_units(text, model, self.max_tokens, self.estimator, self.markers.as_ref());
        if units.is_empty() {
            let chunk = Chunk::whole(text, total_tokens);
            return self.unsplit(ChunkingReason::NoSplittableUnits, vec![chunk], total_tokens, total_chars);
        }

        let spans = self.pack(&units);
        let mut chunks = Vec::with_capacity(spans.len());
        let mut sections = Vec::with_capacity(spans.len());
        let mut prev_end = 0;

        for (index, span) in spans.into_iter().enumerate() {
            let byte_range = units[span.start].range.start..units[span.end - 1].range.end;
            let slice = &text[byte_range.clone()];
            let chunk = Chunk::new(
                index,
                slice.to_string(),
                byte_range,
                self.estimator.estimate(slice, model),
            )
            .with_section(units[span.start].section.clone())
            .with_overlap(index > 0 && span.start < prev_end);
            prev_end = span.end;

            sections.push(distinct_sections(&units[span]));
            chunks.push(chunk);
        }

        let coverage = coverage::measure(
            text,
            model,
            &chunks,
            sections,
            self.estimator,
            total_tokens,
            self.max_tokens,
            self.overlap_tokens,
        );

        info!(
            chunks = chunks.len(),
            coverage_chars = coverage.coverage_ratio_chars,
            coverage_tokens = coverage.coverage_ratio_tokens,
            "text split into semantic chunks"
        );
        ChunkPlan { chunks, coverage }
    }

    /// Greedy packing over unit indices.
    ///
    /// A chunk's cost is the sum of its units' tokens plus the separators
    /// between them. Each returned span is a contiguous, non-empty range of
    /// unit indices.
    fn pack(&self, units: &[Unit]) -> Vec<Range<usize>> {
        let mut token_prefix = Vec::with_capacity(units.len() + 1);
        let mut gap_prefix = Vec::with_capacity(units.len() + 1);
        token_prefix.push(0);
        gap_prefix.push(0);
        for unit in units {
            token_prefix.push(token_prefix[token_prefix.len() - 1] + unit.tokens);
            gap_prefix.push(gap_prefix[gap_prefix.len() - 1] + unit.gap_tokens);
        }
        let cost = |span: Range<usize>| -> usize {
            if span.is_empty() {
                return 0;
            }
            token_prefix[span.end] - token_prefix[span.start] + gap_prefix[span.end]
                - gap_prefix[span.start + 1]
        };

        let mut spans = Vec::new();
        let mut current = 0..0;

        for idx in 0..units.len() {
            if !current.is_empty() && cost(current.start..idx + 1) > self.max_tokens {
                spans.push(current.clone());

                // Seed with the closed chunk's tail, then drop from the front
                // until the incoming unit fits.
                let mut seed = current.end;
                let mut seeded = 0;
                while seed > current.start {
                    let tokens = units[seed - 1].tokens;
                    if seeded + tokens > self.overlap_tokens {
                        break;
                    }
                    seeded += tokens;
                    seed -= 1;
                }
                current = seed..idx;
                while !current.is_empty() && cost(current.start..idx + 1) > self.max_tokens {
                    current.start += 1;
                }
            }
            current.end = idx + 1;
        }
        if !current.is_empty() {
            spans.push(current);
        }
        spans
    }

    fn leading_section(&self, text: &str) -> Option<String> {
        let markers = self.markers.as_ref()?;
        markers.split(text).into_iter().next().map(|section| section.label)
    }

    fn unsplit(
        &self,
        reason: ChunkingReason,
        chunks: Vec<Chunk>,
        total_tokens: usize,
        total_chars: usize,
    ) -> ChunkPlan {
        let coverage = CoverageReport::unsplit(
            reason,
            &chunks,
            total_tokens,
            total_chars,
            self.max_tokens,
            self.overlap_tokens,
        );
        ChunkPlan { chunks, coverage }
    }
}

fn distinct_sections(units: &[Unit]) -> Vec<String> {
    let mut sections: Vec<String> = Vec::new();
    for section in units.iter().filter_map(|u| u.section.as_ref()) {
        if sections.last() != Some(section) {
            sections.push(section.clone());
        }
    }
    sections
}
