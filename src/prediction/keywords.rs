//! Keyword extraction and set overlap

use std::collections::HashSet;

/// Minimum keyword length kept after normalization
const MIN_KEYWORD_LEN: usize = 3;

/// Extract normalized keywords from text
///
/// Lowercases, splits on anything that is not alphanumeric, drops short
/// words and stopwords.
pub fn extract_keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_KEYWORD_LEN)
        .filter(|word| !is_stopword(word))
        .map(|s| s.to_string())
        .collect()
}

/// Check if word is a stopword
fn is_stopword(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "for" | "are" | "but" | "not" | "you" | "all" | "can" | "was"
            | "this" | "that" | "these" | "those" | "with" | "from" | "have" | "been"
            | "were" | "into" | "then" | "than" | "when" | "what" | "which" | "will"
            | "would" | "should" | "could" | "there" | "their" | "about" | "after"
    )
}

/// Jaccard similarity (intersection over union)
///
/// Zero when either side is empty: an empty context matches nothing.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
