//! Approximate matching of raw identifiers against known variants.

use serde::Serialize;
use std::collections::HashMap;

use super::tables::SCRIPT_VARIANTS;

/// Minimum edit-distance similarity accepted as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// How a fuzzy match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// The folded key equals a known variant.
    Folded,
    /// Closest known variant by edit distance.
    EditDistance,
}

/// A fuzzy match result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzyMatch {
    pub canonical: String,
    pub score: f64,
    pub method: MatchMethod,
}

/// Matcher over one vocabulary (intents or entity keys).
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    /// Folded variant -> canonical value
    variants: HashMap<String, &'static str>,
    threshold: f64,
}

impl FuzzyMatcher {
    /// Build from canonical values and `(alias, canonical)` pairs.
    pub fn new(canonical: &[&'static str], aliases: &[(&'static str, &'static str)]) -> Self {
        let mut variants = HashMap::new();
        for value in canonical {
            variants.insert(fold_key(value), *value);
        }
        for (alias, target) in aliases {
            variants.entry(fold_key(alias)).or_insert(*target);
        }
        Self {
            variants,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Override the similarity threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Match an already folded key. Ties on score go to the lexically
    /// smallest variant so results do not depend on map order.
    pub fn find(&self, folded: &str) -> Option<FuzzyMatch> {
        if folded.is_empty() {
            return None;
        }

        if let Some(canonical) = self.variants.get(folded) {
            return Some(FuzzyMatch {
                canonical: canonical.to_string(),
                score: 1.0,
                method: MatchMethod::Folded,
            });
        }

        let mut best: Option<(&str, &str, f64)> = None;
        for (variant, canonical) in &self.variants {
            let score = similarity(folded, variant);
            let better = match best {
                None => true,
                Some((best_variant, _, best_score)) => {
                    score > best_score || (score == best_score && variant.as_str() < best_variant)
                }
            };
            if better {
                best = Some((variant.as_str(), canonical, score));
            }
        }

        best.filter(|(_, _, score)| *score >= self.threshold)
            .map(|(_, canonical, score)| FuzzyMatch {
                canonical: canonical.to_string(),
                score,
                method: MatchMethod::EditDistance,
            })
    }
}

/// Fold a raw identifier: camelCase to snake_case, lowercase, separators to
/// `_`, simplified domain characters to traditional.
pub fn fold_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut prev_lower_or_digit = false;

    for c in raw.trim().chars() {
        if c.is_ascii_uppercase() {
            if prev_lower_or_digit {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else if matches!(c, ' ' | '-' | '.' | '/' | '_') {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower_or_digit = false;
        } else {
            let c = SCRIPT_VARIANTS
                .iter()
                .find(|(simplified, _)| *simplified == c)
                .map(|(_, traditional)| *traditional)
                .unwrap_or(c);
            out.push(c);
            prev_lower_or_digit = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    out.trim_end_matches('_').to_string()
}

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity in [0, 1]: one minus distance over the longer length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::tables::{CANONICAL_INTENTS, INTENT_ALIASES};

    fn intent_matcher() -> FuzzyMatcher {
        FuzzyMatcher::new(CANONICAL_INTENTS, INTENT_ALIASES)
    }

    #[test]
    fn test_fold_key() {
        assert_eq!(fold_key("recordCourse"), "record_course");
        assert_eq!(fold_key("Record-Course "), "record_course");
        assert_eq!(fold_key("query  schedule"), "query_schedule");
        assert_eq!(fold_key("记录课程"), "記錄課程");
        assert_eq!(fold_key("__x__"), "x");
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("課程", "課表"), 1);
        assert!((similarity("abc", "abc") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_find_folded_script_variant() {
        let found = intent_matcher().find(&fold_key("记录课程")).unwrap();
        assert_eq!(found.canonical, "record_course");
        assert_eq!(found.method, MatchMethod::Folded);
    }

    #[test]
    fn test_find_by_edit_distance() {
        let found = intent_matcher().find(&fold_key("cancel_courses")).unwrap();
        assert_eq!(found.canonical, "cancel_course");
        assert_eq!(found.method, MatchMethod::EditDistance);
        assert!(found.score >= DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_no_match_below_threshold() {
        assert!(intent_matcher().find("book_flight").is_none());
        assert!(intent_matcher().find("").is_none());
    }
}
