use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}_]+").expect("valid word regex"));

/// Pluggable text-similarity capability used for query overlap.
///
/// Implementations must return a value in `[0, 1]`.
pub trait SimilarityProvider: Send + Sync {
    fn score(&self, query: &str, candidate: &str) -> f64;
}

/// Jaccard overlap of lower-cased words longer than two characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaccardSimilarity;

impl SimilarityProvider for JaccardSimilarity {
    fn score(&self, query: &str, candidate: &str) -> f64 {
        let a = significant_words(query);
        let b = significant_words(candidate);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count();
        intersection as f64 / union as f64
    }
}

pub fn significant_words(text: &str) -> HashSet<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() > 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_words_ignored() {
        let words = significant_words("a is the parser of it");
        assert!(words.contains("the"));
        assert!(words.contains("parser"));
        assert!(!words.contains("is"));
        assert!(!words.contains("a"));
    }

    #[test]
    fn test_jaccard_bounds() {
        let sim = JaccardSimilarity;
        assert_eq!(sim.score("fix parser bug", "fix parser bug"), 1.0);
        assert_eq!(sim.score("fix parser bug", "render widget"), 0.0);
        assert_eq!(sim.score("", "anything"), 0.0);

        let partial = sim.score("fix parser bug", "parser crashes");
        assert!(partial > 0.0 && partial < 1.0);
    }
}
