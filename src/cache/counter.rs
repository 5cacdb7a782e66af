//! Token cost estimation for cache entries
//!
//! Character-based heuristic, ±10% for English text.
//!
//! # Algorithm
//!
//! Base estimate: 1 token ≈ 4 characters
//! Upper bound: estimate × 1.10 (optional safety margin)
//!
//! # Complexity
//! O(n) where n = text length

use crate::knowledge::types::KnowledgeItem;

/// Token counter with heuristic-based estimation
#[derive(Debug, Clone, Default)]
pub struct TokenCounter {
    /// Charge the 10% upper bound instead of the base estimate
    safety_margin: bool,
}

impl TokenCounter {
    /// Create new token counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter that charges the conservative upper bound
    pub fn with_safety_margin(safety_margin: bool) -> Self {
        Self { safety_margin }
    }

    /// Estimate token count for text
    ///
    /// ```text
    /// estimate_tokens(text) = ⌈len(text) / 4⌉
    /// ```
    pub fn estimate(&self, text: &str) -> usize {
        let char_count = text.chars().count();

        // Ceiling division to avoid underestimation
        (char_count + 3) / 4
    }

    /// Conservative upper bound (110% of estimate, rounded up)
    pub fn upper_bound(&self, text: &str) -> usize {
        let base_estimate = self.estimate(text);
        (base_estimate as f64 * 1.10).ceil() as usize
    }

    /// Cost of holding an item in cache: title and content
    pub fn item_cost(&self, item: &KnowledgeItem) -> usize {
        let text = item.searchable_text();
        if self.safety_margin {
            self.upper_bound(&text)
        } else {
            self.estimate(&text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::KnowledgeKind;

    #[test]
    fn test_basic_estimation() {
        let counter = TokenCounter::new();

        // 100 characters ≈ 25 tokens
        let text = "a".repeat(100);
        assert_eq!(counter.estimate(&text), 25);
    }

    #[test]
    fn test_empty_and_single_character() {
        let counter = TokenCounter::new();
        assert_eq!(counter.estimate(""), 0);
        // 1 char = 1 token (ceiling division)
        assert_eq!(counter.estimate("a"), 1);
    }

    #[test]
    fn test_upper_bound() {
        let counter = TokenCounter::new();

        // 25 tokens × 1.10 = 27.5 → 28
        let text = "a".repeat(100);
        assert_eq!(counter.upper_bound(&text), 28);
    }

    #[test]
    fn test_unicode_characters() {
        let counter = TokenCounter::new();

        // 3 chars / 4 = 0.75 → 1
        assert_eq!(counter.estimate("日本語"), 1);
    }

    #[test]
    fn test_item_cost_counts_title_and_content() {
        // "title" + "\n" + 94 chars = 100 chars = 25 tokens
        let item = KnowledgeItem::new("a", KnowledgeKind::Factual, "title", "x".repeat(94));
        assert_eq!(TokenCounter::new().item_cost(&item), 25);
        assert_eq!(TokenCounter::with_safety_margin(true).item_cost(&item), 28);
    }
}
