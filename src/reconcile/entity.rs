//! Near-duplicate clustering for structured entities.

use super::similarity::{composite_score, normalize};

/// Similarity at or above which two entities are the same.
pub const DEFAULT_CLUSTER_THRESHOLD: f64 = 0.75;

/// A structured item extracted independently from several chunks, such as
/// a theme, a party or a cited rule.
pub trait Entity {
    /// Short identifying text, compared by fuzzy ratio.
    fn primary_label(&self) -> &str;

    /// All descriptive text, compared by word overlap and fuzzy ratio.
    fn full_text(&self) -> String;

    /// How filled-in the entity is; the most complete member of a cluster
    /// survives.
    fn completeness(&self) -> usize;
}

/// Scorer for [`Entity::completeness`]: counts populated fields and
/// evidence items.
///
/// # Examples
///
/// ```
/// use chunkwise::reconcile::Completeness;
///
/// let score = Completeness::default()
///     .field("Res judicata")
///     .field("")
///     .evidence(3)
///     .score();
/// assert_eq!(score, 1 * Completeness::FIELD_WEIGHT + 3);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Completeness {
    score: usize,
}

impl Completeness {
    /// Weight of one populated field relative to one evidence item.
    pub const FIELD_WEIGHT: usize = 10;

    /// Adds a text field, counted when non-blank.
    #[must_use]
    pub fn field(mut self, value: &str) -> Self {
        if !value.trim().is_empty() {
            self.score += Self::FIELD_WEIGHT;
        }
        self
    }

    /// Adds an optional field, counted when present.
    #[must_use]
    pub fn optional<T>(mut self, value: Option<&T>) -> Self {
        if value.is_some() {
            self.score += Self::FIELD_WEIGHT;
        }
        self
    }

    /// Adds `count` evidence items (citations, quotes, references).
    #[must_use]
    pub const fn evidence(mut self, count: usize) -> Self {
        self.score += count;
        self
    }

    /// Final score.
    pub const fn score(self) -> usize {
        self.score
    }
}

struct Cluster<E> {
    keep: E,
    keep_score: usize,
    labels: Vec<String>,
    texts: Vec<String>,
}

impl<E: Entity> Cluster<E> {
    fn matches(&self, label: &str, text: &str, threshold: f64) -> bool {
        // Blank labels carry no identity; only the score can merge them.
        let same_label = |l: &String| !label.is_empty() && l == label;
        self.labels
            .iter()
            .zip(&self.texts)
            .any(|(l, t)| same_label(l) || composite_score(l, t, label, text) >= threshold)
    }
}

/// Groups near-duplicate entities and keeps the most complete member of
/// each group.
///
/// Entities whose normalized labels are equal and non-blank always share a
/// group. Group order follows first appearance; ties on completeness keep
/// the earlier entity. Returns the survivors and the number of entities removed.
pub fn cluster<E: Entity>(entities: Vec<E>, threshold: f64) -> (Vec<E>, usize) {
    let total = entities.len();
    let mut clusters: Vec<Cluster<E>> = Vec::new();

    for entity in entities {
        let label = normalize(entity.primary_label());
        let text = normalize(&entity.full_text());
        let score = entity.completeness();

        match clusters
            .iter_mut()
            .find(|c| c.matches(&label, &text, threshold))
        {
            Some(existing) => {
                if score > existing.keep_score {
                    existing.keep = entity;
                    existing.keep_score = score;
                }
                existing.labels.push(label);
                existing.texts.push(text);
            }
            None => clusters.push(Cluster {
                keep: entity,
                keep_score: score,
                labels: vec![label],
                texts: vec![text],
            }),
        }
    }

    let removed = total - clusters.len();
    (clusters.into_iter().map(|c| c.keep).collect(), removed)
}
