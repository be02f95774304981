//! Reduce phase: merging per-chunk partial results into one.
//!
//! A result type opts in by implementing [`Reconcile`], which names a
//! [`MergePolicy`] rule for each field that needs more than "keep the first
//! chunk's value". Near-duplicate entities are clustered by text similarity
//! and categorical verdicts are decided by majority vote; undecidable
//! verdicts are reported, never guessed.

pub mod entity;
pub mod policy;
pub mod similarity;
pub mod verdict;

pub use entity::{Completeness, DEFAULT_CLUSTER_THRESHOLD, Entity, cluster};
pub use policy::{CONCAT_SEPARATOR, MergePolicy, MergedResult, Presence};
pub use verdict::{ConflictKind, DEFAULT_HIGH_CONFIDENCE, Verdict, VerdictConflict, vote};

use crate::error::Result;
use tracing::info;

/// A partial result type that can be merged across chunks.
pub trait Reconcile: Clone + 'static {
    /// Merge rules for this type.
    fn merge_policy() -> MergePolicy<Self>;
}

/// Merges per-chunk partial results, in chunk order, with the type's
/// [`MergePolicy`].
///
/// # Errors
///
/// Returns [`crate::error::ReconcileError::Empty`] for an empty input.
pub fn reconcile<T: Reconcile>(partials: Vec<T>) -> Result<MergedResult<T>> {
    let merged = T::merge_policy().merge(partials)?;
    info!(
        chunks_merged = merged.chunks_merged,
        duplicates_removed = merged.duplicates_removed,
        conflicts = merged.conflicts.len(),
        "partial results reconciled"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Theme {
        title: String,
        text: String,
        citations: Vec<String>,
    }

    impl Entity for Theme {
        fn primary_label(&self) -> &str {
            &self.title
        }

        fn full_text(&self) -> String {
            format!("{} {}", self.title, self.text)
        }

        fn completeness(&self) -> usize {
            Completeness::default()
                .field(&self.text)
                .evidence(self.citations.len())
                .score()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Ruling {
        Upheld,
        Reversed,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Analysis {
        themes: Vec<Theme>,
        formatted: String,
        ruling: Option<Verdict<Ruling>>,
    }

    impl Reconcile for Analysis {
        fn merge_policy() -> MergePolicy<Self> {
            MergePolicy::<Self>::new()
                .cluster("themes", |a| &mut a.themes)
                .concat("formatted", |a| &mut a.formatted)
                .verdict("ruling", |a| &mut a.ruling)
        }
    }

    fn theme(title: &str, text: &str, citations: usize) -> Theme {
        Theme {
            title: title.to_string(),
            text: text.to_string(),
            citations: (0..citations).map(|i| format!("cite {i}")).collect(),
        }
    }

    #[test]
    fn test_reconcile_across_chunks() {
        let partials = vec![
            Analysis {
                themes: vec![theme("Res judicata", "", 0), theme("Costs", "who pays costs", 1)],
                formatted: "Part one".to_string(),
                ruling: Some(Verdict::new(Ruling::Upheld)),
            },
            Analysis {
                themes: vec![theme("RES JUDICATA", "claim already decided in prior suit", 3)],
                formatted: "Part two".to_string(),
                ruling: Some(Verdict::new(Ruling::Upheld)),
            },
            Analysis {
                themes: Vec::new(),
                formatted: String::new(),
                ruling: Some(Verdict::new(Ruling::Reversed)),
            },
        ];

        let merged = reconcile(partials).unwrap();
        assert_eq!(merged.chunks_merged, 3);
        assert_eq!(merged.duplicates_removed, 1);

        let value = merged.into_resolved().unwrap();
        assert_eq!(value.themes.len(), 2);
        assert_eq!(value.themes[0].title, "RES JUDICATA");
        assert_eq!(value.themes[0].citations.len(), 3);
        assert_eq!(value.themes[1].title, "Costs");
        assert_eq!(value.formatted, format!("Part one{CONCAT_SEPARATOR}Part two"));
        assert_eq!(value.ruling.map(|v| v.value), Some(Ruling::Upheld));
    }

    #[test]
    fn test_single_partial_passes_through() {
        let only = Analysis {
            themes: vec![theme("A", "", 0), theme("a", "", 0)],
            formatted: "x".to_string(),
            ruling: None,
        };
        let merged = reconcile(vec![only.clone()]).unwrap();
        assert_eq!(merged.value, only);
    }

    #[test]
    fn test_empty_is_an_error() {
        assert!(reconcile(Vec::<Analysis>::new()).is_err());
    }
}
