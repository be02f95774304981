//! Per-field merge rules.
//!
//! A [`MergePolicy`] lists, for each field of a result type, how the values
//! reported by every chunk combine into one. Fields without a rule keep the
//! value of the first partial result.
//!
//! Built-in rules move values out of the partial results as they merge.
//! Custom rules registered with [`MergePolicy::with`] run first, so they
//! always see every partial result intact.

use super::entity::{DEFAULT_CLUSTER_THRESHOLD, Entity, cluster};
use super::verdict::{DEFAULT_HIGH_CONFIDENCE, Verdict, VerdictConflict, vote};
use crate::error::{ReconcileError, Result};
use std::collections::HashSet;
use std::fmt::Debug;
use tracing::debug;

/// Separator placed between concatenated text fields.
pub const CONCAT_SEPARATOR: &str = "\n\n---\n\n";

/// Values that may be missing from a partial result.
pub trait Presence: Default {
    /// Whether the value carries information.
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.as_ref().is_some_and(Presence::is_present)
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! always_present {
    ($($ty:ty),*) => {
        $(impl Presence for $ty {
            fn is_present(&self) -> bool {
                true
            }
        })*
    };
}

// Numbers and flags are values in their own right; wrap them in `Option`
// to express absence.
always_present!(bool, u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

/// Thresholds of the running merge plus what it has observed so far.
#[derive(Debug)]
struct MergeState {
    cluster_threshold: f64,
    high_confidence: f64,
    duplicates_removed: usize,
    conflicts: Vec<VerdictConflict>,
}

type Apply<T> = Box<dyn Fn(&mut T, &mut [T], &mut MergeState) + Send + Sync>;

struct Rule<T> {
    field: &'static str,
    custom: bool,
    apply: Apply<T>,
}

/// Outcome of reconciling several partial results.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult<T> {
    /// The merged value. Conflicting verdict fields are `None`.
    pub value: T,
    /// Number of partial results merged.
    pub chunks_merged: usize,
    /// List items and entities dropped as duplicates.
    pub duplicates_removed: usize,
    /// Verdict fields left undecided.
    pub conflicts: Vec<VerdictConflict>,
}

impl<T> MergedResult<T> {
    /// Whether every verdict field was decided.
    pub fn is_resolved(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Returns the merged value, or the conflicting field names.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Conflicts`] if any verdict was undecided.
    pub fn into_resolved(self) -> Result<T> {
        if self.conflicts.is_empty() {
            return Ok(self.value);
        }
        let fields = self.conflicts.into_iter().map(|c| c.field).collect();
        Err(ReconcileError::Conflicts { fields }.into())
    }
}

/// Field-by-field merge rules for `T`.
///
/// # Examples
///
/// ```
/// use chunkwise::reconcile::MergePolicy;
///
/// #[derive(Clone, Default)]
/// struct Notes {
///     title: String,
///     tags: Vec<String>,
///     urgent: bool,
/// }
///
/// let policy = MergePolicy::<Notes>::new()
///     .first_present("title", |n| &mut n.title)
///     .union_dedup("tags", |n| &mut n.tags)
///     .any("urgent", |n| &mut n.urgent);
///
/// let merged = policy
///     .merge(vec![
///         Notes { title: String::new(), tags: vec!["a".into()], urgent: false },
///         Notes { title: "Report".into(), tags: vec!["A".into(), "b".into()], urgent: true },
///     ])
///     .unwrap();
/// assert_eq!(merged.value.title, "Report");
/// assert_eq!(merged.value.tags, vec!["a", "b"]);
/// assert!(merged.value.urgent);
/// assert_eq!(merged.duplicates_removed, 1);
/// ```
pub struct MergePolicy<T> {
    rules: Vec<Rule<T>>,
    cluster_threshold: f64,
    high_confidence: f64,
}

impl<T> Debug for MergePolicy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergePolicy")
            .field("fields", &self.rules.iter().map(|r| r.field).collect::<Vec<_>>())
            .field("cluster_threshold", &self.cluster_threshold)
            .field("high_confidence", &self.high_confidence)
            .finish()
    }
}

impl<T: Clone + 'static> Default for MergePolicy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> MergePolicy<T> {
    /// Empty policy with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            cluster_threshold: DEFAULT_CLUSTER_THRESHOLD,
            high_confidence: DEFAULT_HIGH_CONFIDENCE,
        }
    }

    /// Similarity at or above which entities are merged.
    #[must_use]
    pub const fn cluster_threshold(mut self, threshold: f64) -> Self {
        self.cluster_threshold = threshold;
        self
    }

    /// Confidence at or above which disagreeing verdicts conflict.
    #[must_use]
    pub const fn high_confidence(mut self, confidence: f64) -> Self {
        self.high_confidence = confidence;
        self
    }

    /// Names of the fields with a rule, in registration order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.field).collect()
    }

    fn rule(
        mut self,
        field: &'static str,
        apply: impl Fn(&mut T, &mut [T], &mut MergeState) + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            field,
            custom: false,
            apply: Box::new(apply),
        });
        self
    }

    /// Rules in application order: custom rules first, then built-ins, each
    /// group in registration order.
    fn ordered_rules(&self) -> impl Iterator<Item = &Rule<T>> {
        let custom = self.rules.iter().filter(|r| r.custom);
        custom.chain(self.rules.iter().filter(|r| !r.custom))
    }

    /// Takes the first present value in chunk order.
    #[must_use]
    pub fn first_present<F: Presence + 'static>(
        self,
        field: &'static str,
        access: fn(&mut T) -> &mut F,
    ) -> Self {
        self.rule(field, move |base, parts, _| {
            if let Some(i) = parts.iter_mut().position(|p| access(p).is_present()) {
                *access(base) = std::mem::take(access(&mut parts[i]));
            }
        })
    }

    /// Unions string lists, dropping blank items and duplicates under a
    /// trimmed, case-insensitive key. First-seen spelling and order win.
    #[must_use]
    pub fn union_dedup(self, field: &'static str, access: fn(&mut T) -> &mut Vec<String>) -> Self {
        self.rule(field, move |base, parts, state| {
            let mut seen = HashSet::new();
            let mut merged = Vec::new();
            for part in parts.iter_mut() {
                for item in std::mem::take(access(part)) {
                    let item = item.trim();
                    if item.is_empty() {
                        continue;
                    }
                    if seen.insert(item.to_lowercase()) {
                        merged.push(item.to_string());
                    } else {
                        state.duplicates_removed += 1;
                    }
                }
            }
            *access(base) = merged;
        })
    }

    /// Logical OR across chunks.
    #[must_use]
    pub fn any(self, field: &'static str, access: fn(&mut T) -> &mut bool) -> Self {
        self.rule(field, move |base, parts, _| {
            let value = parts.iter_mut().any(|p| *access(p));
            *access(base) = value;
        })
    }

    /// Joins non-blank text in chunk order with [`CONCAT_SEPARATOR`].
    #[must_use]
    pub fn concat(self, field: &'static str, access: fn(&mut T) -> &mut String) -> Self {
        self.rule(field, move |base, parts, _| {
            let pieces: Vec<String> = parts
                .iter_mut()
                .map(|p| std::mem::take(access(p)))
                .filter(|s| !s.trim().is_empty())
                .collect();
            *access(base) = pieces.join(CONCAT_SEPARATOR);
        })
    }

    /// Clusters near-duplicate entities, keeping the most complete of each
    /// cluster.
    #[must_use]
    pub fn cluster<E: Entity + 'static>(
        self,
        field: &'static str,
        access: fn(&mut T) -> &mut Vec<E>,
    ) -> Self {
        self.rule(field, move |base, parts, state| {
            let all: Vec<E> = parts
                .iter_mut()
                .flat_map(|p| std::mem::take(access(p)))
                .collect();
            let (kept, removed) = cluster(all, state.cluster_threshold);
            state.duplicates_removed += removed;
            *access(base) = kept;
        })
    }

    /// Majority vote; ties and confident disagreements leave the field
    /// `None` and are reported as conflicts.
    #[must_use]
    pub fn verdict<V>(self, field: &'static str, access: fn(&mut T) -> &mut Option<Verdict<V>>) -> Self
    where
        V: PartialEq + Clone + Debug + 'static,
    {
        self.rule(field, move |base, parts, state| {
            let votes: Vec<Verdict<V>> = parts.iter_mut().filter_map(|p| access(p).take()).collect();
            *access(base) = match vote(field, &votes, state.high_confidence) {
                Ok(decided) => decided,
                Err(conflict) => {
                    state.conflicts.push(conflict);
                    None
                }
            };
        })
    }

    /// Custom rule over the merged value and every partial result.
    ///
    /// Custom rules run before every built-in rule and see the partial
    /// results unmodified.
    #[must_use]
    pub fn with(
        mut self,
        field: &'static str,
        merge: impl Fn(&mut T, &mut [T]) + Send + Sync + 'static,
    ) -> Self {
        self.rules.push(Rule {
            field,
            custom: true,
            apply: Box::new(move |base, parts, _| merge(base, parts)),
        });
        self
    }

    /// Merges partial results in chunk order.
    ///
    /// A single partial result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Empty`] for an empty input.
    pub fn merge(&self, mut partials: Vec<T>) -> Result<MergedResult<T>> {
        let chunks_merged = partials.len();
        let Some(first) = partials.first() else {
            return Err(ReconcileError::Empty.into());
        };
        if chunks_merged == 1 {
            let value = partials.swap_remove(0);
            return Ok(MergedResult {
                value,
                chunks_merged,
                duplicates_removed: 0,
                conflicts: Vec::new(),
            });
        }

        let mut base = first.clone();
        let mut state = MergeState {
            cluster_threshold: self.cluster_threshold,
            high_confidence: self.high_confidence,
            duplicates_removed: 0,
            conflicts: Vec::new(),
        };
        for rule in self.ordered_rules() {
            (rule.apply)(&mut base, &mut partials, &mut state);
            debug!(field = rule.field, "field merged");
        }

        Ok(MergedResult {
            value: base,
            chunks_merged,
            duplicates_removed: state.duplicates_removed,
            conflicts: state.conflicts,
        })
    }
}
