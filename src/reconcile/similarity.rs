//! Text similarity for entity clustering.
//!
//! All comparisons run on normalized text: accents stripped, lowercased,
//! punctuation replaced by spaces, whitespace collapsed.

use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_segmentation::UnicodeSegmentation;

/// Weight of the token-set Jaccard index over full text.
pub const JACCARD_WEIGHT: f64 = 0.45;
/// Weight of the fuzzy ratio over primary labels.
pub const LABEL_WEIGHT: f64 = 0.35;
/// Weight of the fuzzy ratio over full text.
pub const FULL_TEXT_WEIGHT: f64 = 0.20;

/// Accent-, case- and punctuation-insensitive form of `text`.
///
/// # Examples
///
/// ```
/// use chunkwise::reconcile::similarity::normalize;
///
/// assert_eq!(normalize("  Prescrição, INTERCORRENTE! "), "prescricao intercorrente");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Jaccard index of the word sets of two normalized texts.
#[must_use]
pub fn token_set_jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.unicode_words().collect();
    let right: HashSet<&str> = b.unicode_words().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

/// Indel similarity of two strings: `2 * LCS / (len(a) + len(b))` over
/// characters, in `[0, 1]`.
#[must_use]
pub fn fuzzy_ratio(a: &str, b: &str) -> f64 {
    let left: Vec<char> = a.chars().collect();
    let right: Vec<char> = b.chars().collect();
    let total = left.len() + right.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * longest_common_subsequence(&left, &right) as f64 / total as f64
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for &x in long {
        for (j, &y) in short.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Composite similarity of two entities given their normalized primary
/// labels and full texts.
#[must_use]
pub fn composite_score(label_a: &str, full_a: &str, label_b: &str, full_b: &str) -> f64 {
    JACCARD_WEIGHT * token_set_jaccard(full_a, full_b)
        + LABEL_WEIGHT * fuzzy_ratio(label_a, label_b)
        + FULL_TEXT_WEIGHT * fuzzy_ratio(full_a, full_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Ação Rescisória", "acao rescisoria"; "accents and case")]
    #[test_case("dano-moral; (art. 5º)", "dano moral art 5o"; "punctuation")]
    #[test_case("  many   spaces\n", "many spaces"; "whitespace")]
    #[test_case("", ""; "empty")]
    fn test_normalize(input: &str, expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn test_jaccard() {
        assert!((token_set_jaccard("a b c", "a b c") - 1.0).abs() < f64::EPSILON);
        assert!((token_set_jaccard("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
        assert!(token_set_jaccard("a b", "c d").abs() < f64::EPSILON);
        assert!(token_set_jaccard("", "a").abs() < f64::EPSILON);
    }

    #[test]
    fn test_fuzzy_ratio() {
        assert!((fuzzy_ratio("abc", "abc") - 1.0).abs() < f64::EPSILON);
        assert!(fuzzy_ratio("abc", "xyz").abs() < f64::EPSILON);
        // LCS("kitten", "sitting") = 4 ("ittn")
        assert!((fuzzy_ratio("kitten", "sitting") - 8.0 / 13.0).abs() < 1e-9);
        assert!((fuzzy_ratio("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_composite_score_bounds() {
        let same = composite_score("label", "some full text", "label", "some full text");
        assert!((same - 1.0).abs() < 1e-9);
        let different = composite_score("alpha", "alpha beta", "zeta", "gamma delta");
        assert!(different < 0.5);
    }
}
