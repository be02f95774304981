//! Paragraph units.
//!
//! The packer works on paragraph-like units: maximal runs of non-blank lines,
//! trimmed, with their byte offsets in the source. A unit that alone exceeds
//! the chunk budget is hard-split by characters first.

use crate::chunking::sections::{PREAMBLE, SectionMarkers};
use crate::io::{find_char_boundary, find_char_boundary_forward, find_sentence_break};
use crate::tokens::TokenEstimator;
use rayon::prelude::*;
use std::ops::Range;
use tracing::debug;

/// Safety margin applied to the hard-split target size.
const HARD_SPLIT_MARGIN: f64 = 0.9;

/// Maximum bytes searched past the target for a sentence break.
const LOOKAHEAD_BYTES: usize = 200;

/// Re-split depth for pieces whose local density defeated the estimate.
const MAX_SPLIT_DEPTH: usize = 4;

/// A packable unit of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Byte range of the trimmed unit in the source text.
    pub range: Range<usize>,
    /// Token estimate of the unit text.
    pub tokens: usize,
    /// Token estimate of the whitespace separating this unit from the
    /// previous one (0 for the first unit).
    pub gap_tokens: usize,
    /// Section the unit falls under, when markers are configured.
    pub section: Option<String>,
}

/// Paragraph before estimation.
#[derive(Debug)]
struct RawUnit {
    range: Range<usize>,
    section: Option<String>,
}

/// Splits `text` into paragraph ranges on blank lines.
///
/// Returned ranges are trimmed of surrounding whitespace and never empty.
#[must_use]
pub fn paragraph_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if let Some(range) = current.take() {
                ranges.push(range);
            }
            continue;
        }
        let lead = line.len() - line.trim_start().len();
        let end = line_start + lead + trimmed.len();
        match current.as_mut() {
            Some(range) => range.end = end,
            None => current = Some(line_start + lead..end),
        }
    }
    if let Some(range) = current {
        ranges.push(range);
    }
    ranges
}

/// Builds estimated units for `text`, hard-splitting any paragraph above
/// `max_tokens`.
///
/// Estimation runs in parallel; unit order follows the source.
pub fn build_units(
    text: &str,
    model: &str,
    max_tokens: usize,
    estimator: TokenEstimator,
    markers: Option<&SectionMarkers>,
) -> Vec<Unit> {
    let raw = label_sections(text, paragraph_ranges(text), markers);

    let mut units: Vec<Unit> = raw
        .into_par_iter()
        .flat_map_iter(|raw| {
            let tokens = estimator.estimate(&text[raw.range.clone()], model);
            if tokens > max_tokens {
                debug!(
                    start = raw.range.start,
                    tokens, max_tokens, "hard-splitting oversized paragraph"
                );
                hard_split(text, raw.range, tokens, model, max_tokens, estimator, 0)
                    .into_iter()
                    .map(|(range, tokens)| Unit {
                        range,
                        tokens,
                        gap_tokens: 0,
                        section: raw.section.clone(),
                    })
                    .collect::<Vec<_>>()
            } else {
                vec![Unit {
                    range: raw.range,
                    tokens,
                    gap_tokens: 0,
                    section: raw.section,
                }]
            }
        })
        .collect();

    let gaps: Vec<usize> = units
        .par_windows(2)
        .map(|pair| estimator.estimate(&text[pair[0].range.end..pair[1].range.start], model))
        .collect();
    for (unit, gap) in units.iter_mut().skip(1).zip(gaps) {
        unit.gap_tokens = gap;
    }
    units
}

fn label_sections(
    text: &str,
    ranges: Vec<Range<usize>>,
    markers: Option<&SectionMarkers>,
) -> Vec<RawUnit> {
    let Some(markers) = markers else {
        return ranges
            .into_iter()
            .map(|range| RawUnit { range, section: None })
            .collect();
    };

    let mut section = PREAMBLE.to_string();
    ranges
        .into_iter()
        .map(|range| {
            let first_line = text[range.clone()].lines().next().unwrap_or_default();
            if let Some(label) = markers.label_of(first_line) {
                section = label;
            }
            RawUnit {
                range,
                section: Some(section.clone()),
            }
        })
        .collect()
}

/// Hard-splits `text[range]` into pieces of about `max_tokens` each.
///
/// The target piece size comes from the range's own bytes-per-token ratio
/// with a safety margin. Each cut prefers a sentence break within a short
/// lookahead past the target. Pieces are trimmed; whitespace-only pieces
/// are dropped. Returns `(range, tokens)` pairs.
fn hard_split(
    text: &str,
    range: Range<usize>,
    tokens: usize,
    model: &str,
    max_tokens: usize,
    estimator: TokenEstimator,
    depth: usize,
) -> Vec<(Range<usize>, usize)> {
    let bytes_per_token = range.len() as f64 / tokens.max(1) as f64;
    let target = ((max_tokens as f64 * bytes_per_token * HARD_SPLIT_MARGIN) as usize).max(1);
    let lookahead = LOOKAHEAD_BYTES.min(target / 5);

    let mut pieces = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let mut end = start + target;
        if end >= range.end {
            end = range.end;
        } else {
            end = find_char_boundary(text, end);
            if end <= start {
                end = find_char_boundary_forward(text, start + 1);
            }
            let search_end = (end + lookahead).min(range.end);
            if let Some(brk) = find_sentence_break(text, end, search_end) {
                end = brk;
            }
        }

        let piece = trim_range(text, start..end);
        if !piece.is_empty() {
            let piece_tokens = estimator.estimate(&text[piece.clone()], model);
            if piece_tokens > max_tokens && depth < MAX_SPLIT_DEPTH && piece.len() > 1 {
                pieces.extend(hard_split(
                    text,
                    piece,
                    piece_tokens,
                    model,
                    max_tokens,
                    estimator,
                    depth + 1,
                ));
            } else {
                pieces.push((piece, piece_tokens));
            }
        }
        start = end;
    }
    pieces
}

/// Shrinks `range` to exclude leading and trailing whitespace.
fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    if lead == slice.len() {
        return range.start..range.start;
    }
    range.start + lead..range.end - trail
}
