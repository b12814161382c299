// Fuzzy text scoring used to rank OCR blocks against an oracle target.
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy)]
pub struct MatchWeights {
    pub token: f64,
    pub prefix: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            token: 0.7,
            prefix: 0.3,
        }
    }
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex"))
}

/// Lowercased word tokens.
pub fn tokens(s: &str) -> Vec<String> {
    word_re()
        .find_iter(s)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Share of the target's distinct tokens that also occur in `text`.
pub fn token_overlap_ratio(target: &str, text: &str) -> f64 {
    let target: HashSet<String> = tokens(target).into_iter().collect();
    if target.is_empty() {
        return 0.0;
    }
    let text: HashSet<String> = tokens(text).into_iter().collect();
    target.intersection(&text).count() as f64 / target.len() as f64
}

/// Common prefix length (in chars, case-insensitive) over the longer string's length.
pub fn normalized_common_prefix(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let common = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    common as f64 / longest as f64
}

/// Score of candidate `text` against `target`, in `0.0..=1.0` for weights summing to 1.
pub fn score_with(text: &str, target: &str, weights: MatchWeights) -> f64 {
    weights.token * token_overlap_ratio(target, text)
        + weights.prefix * normalized_common_prefix(text, target)
}

pub fn score(text: &str, target: &str) -> f64 {
    score_with(text, target, MatchWeights::default())
}

/// True when at least `ratio` of the target's words appear in `haystack`.
pub fn words_present(target: &str, haystack: &str, ratio: f64) -> bool {
    let words = tokens(target);
    if words.is_empty() {
        return false;
    }
    let hay: HashSet<String> = tokens(haystack).into_iter().collect();
    let hits = words.iter().filter(|w| hay.contains(*w)).count();
    hits as f64 / words.len() as f64 >= ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_label_clears_threshold() {
        assert!(score("search bar", "search") >= 0.25);
        assert!(score("unrelated label", "search") < 0.25);
    }

    #[test]
    fn exact_match_scores_one() {
        assert!((score("Wi-Fi", "wi-fi") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prefix_is_case_insensitive() {
        assert!((normalized_common_prefix("Settings", "set") - 3.0 / 8.0).abs() < 1e-9);
        assert_eq!(normalized_common_prefix("", ""), 0.0);
    }

    #[test]
    fn word_ratio_counts_target_words() {
        assert!(words_present("dark mode toggle", "Display\nDark mode\nFont size", 0.6));
        assert!(!words_present("dark mode toggle", "Display\nDark theme", 0.7));
        assert!(!words_present("", "anything", 0.7));
    }
}
