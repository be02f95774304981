//! Majority voting over categorical verdicts.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Confidence at or above which disagreeing verdicts are never outvoted.
pub const DEFAULT_HIGH_CONFIDENCE: f64 = 0.8;

/// A categorical outcome reported by one chunk, with optional confidence in
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict<V> {
    /// The category.
    pub value: V,
    /// Reported confidence, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl<V> Verdict<V> {
    /// Verdict without a confidence.
    pub const fn new(value: V) -> Self {
        Self {
            value,
            confidence: None,
        }
    }

    /// Verdict with a confidence.
    pub const fn with_confidence(value: V, confidence: f64) -> Self {
        Self {
            value,
            confidence: Some(confidence),
        }
    }
}

/// Why a verdict could not be decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two or more values share the highest vote count.
    Tie,
    /// Different values were each reported with high confidence.
    ConfidentDisagreement,
}

/// An undecided categorical field, left for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictConflict {
    /// Field name.
    pub field: String,
    /// Distinct candidate values with their vote counts, most voted first.
    pub candidates: Vec<(String, usize)>,
    /// Conflict kind.
    pub kind: ConflictKind,
}

struct Tally<'a, V> {
    value: &'a V,
    votes: usize,
    best_confidence: Option<f64>,
}

/// Decides one categorical field from the verdicts reported by each chunk.
///
/// Absent verdicts abstain. Returns `Ok(None)` when nobody voted, the
/// winning verdict (with the highest confidence among its voters) on a
/// strict majority, and a conflict on a tie or when distinct values were
/// each reported with confidence at or above `high_confidence`.
pub fn vote<'a, V, I>(
    field: &str,
    verdicts: I,
    high_confidence: f64,
) -> Result<Option<Verdict<V>>, VerdictConflict>
where
    V: PartialEq + Clone + Debug + 'a,
    I: IntoIterator<Item = &'a Verdict<V>>,
{
    let mut tallies: Vec<Tally<'a, V>> = Vec::new();
    for verdict in verdicts {
        let confidence = verdict.confidence;
        if let Some(tally) = tallies.iter_mut().find(|t| *t.value == verdict.value) {
            tally.votes += 1;
            tally.best_confidence = max_confidence(tally.best_confidence, confidence);
        } else {
            tallies.push(Tally {
                value: &verdict.value,
                votes: 1,
                best_confidence: confidence,
            });
        }
    }

    if tallies.is_empty() {
        return Ok(None);
    }

    // Stable: equal counts keep first-seen order.
    tallies.sort_by(|a, b| b.votes.cmp(&a.votes));

    let confident = tallies
        .iter()
        .filter(|t| t.best_confidence.is_some_and(|c| c >= high_confidence))
        .count();
    let kind = if confident >= 2 {
        Some(ConflictKind::ConfidentDisagreement)
    } else if tallies.len() >= 2 && tallies[0].votes == tallies[1].votes {
        Some(ConflictKind::Tie)
    } else {
        None
    };

    if let Some(kind) = kind {
        return Err(VerdictConflict {
            field: field.to_string(),
            candidates: tallies
                .iter()
                .map(|t| (format!("{:?}", t.value), t.votes))
                .collect(),
            kind,
        });
    }

    let winner = &tallies[0];
    Ok(Some(Verdict {
        value: winner.value.clone(),
        confidence: winner.best_confidence,
    }))
}

fn max_confidence(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Outcome {
        Granted,
        Denied,
        Partial,
    }

    #[test]
    fn test_no_votes() {
        let verdicts: Vec<Verdict<Outcome>> = Vec::new();
        assert_eq!(vote("outcome", &verdicts, 0.8), Ok(None));
    }

    #[test]
    fn test_majority_wins_with_best_confidence() {
        let verdicts = vec![
            Verdict::with_confidence(Outcome::Granted, 0.6),
            Verdict::new(Outcome::Denied),
            Verdict::with_confidence(Outcome::Granted, 0.7),
        ];
        let winner = vote("outcome", &verdicts, 0.8).unwrap().unwrap();
        assert_eq!(winner.value, Outcome::Granted);
        assert_eq!(winner.confidence, Some(0.7));
    }

    #[test]
    fn test_tie_is_a_conflict() {
        let verdicts = vec![
            Verdict::new(Outcome::Granted),
            Verdict::new(Outcome::Denied),
            Verdict::new(Outcome::Partial),
            Verdict::new(Outcome::Denied),
            Verdict::new(Outcome::Granted),
        ];
        let conflict = vote("outcome", &verdicts, 0.8).unwrap_err();
        assert_eq!(conflict.kind, ConflictKind::Tie);
        assert_eq!(conflict.field, "outcome");
        assert_eq!(
            conflict.candidates,
            vec![
                ("Granted".to_string(), 2),
                ("Denied".to_string(), 2),
                ("Partial".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_confident_minority_blocks_majority() {
        let verdicts = vec![
            Verdict::new(Outcome::Granted),
            Verdict::with_confidence(Outcome::Granted, 0.9),
            Verdict::with_confidence(Outcome::Denied, 0.95),
        ];
        let conflict = vote("outcome", &verdicts, 0.8).unwrap_err();
        assert_eq!(conflict.kind, ConflictKind::ConfidentDisagreement);
    }

    #[test]
    fn test_unanimous_confident_votes_agree() {
        let verdicts = vec![
            Verdict::with_confidence(Outcome::Partial, 0.9),
            Verdict::with_confidence(Outcome::Partial, 0.99),
        ];
        let winner = vote("outcome", &verdicts, 0.8).unwrap().unwrap();
        assert_eq!(winner.value, Outcome::Partial);
        assert_eq!(winner.confidence, Some(0.99));
    }
}
