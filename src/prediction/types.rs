//! Recommendation and prediction option types

use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, Result};
use crate::knowledge::types::ItemId;
use crate::patterns::types::PatternId;

/// Confidence-scored suggestion to load one item. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub item_id: ItemId,
    /// Final confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable trigger description
    pub rationale: String,
    /// Pattern that contributed the boost, if any
    pub matched_pattern_id: Option<PatternId>,
}

/// Weights of the confidence components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub lexical: f64,
    pub pattern: f64,
    pub importance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            pattern: 0.3,
            importance: 0.2,
        }
    }
}

/// Prediction options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionOptions {
    /// Minimum confidence for a recommendation to be returned
    pub confidence_threshold: f64,

    /// Maximum recommendations returned
    pub max_results: usize,

    /// Component weights
    pub weights: ScoreWeights,
}

impl Default for PredictionOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            max_results: 10,
            weights: ScoreWeights::default(),
        }
    }
}

impl PredictionOptions {
    pub fn with_threshold(mut self, confidence_threshold: f64) -> Self {
        self.confidence_threshold = confidence_threshold;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Reject malformed options
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CacheError::Validation(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_results == 0 {
            return Err(CacheError::Validation("max_results must be positive".to_string()));
        }
        let w = &self.weights;
        for (name, value) in [("lexical", w.lexical), ("pattern", w.pattern), ("importance", w.importance)] {
            if !value.is_finite() || value < 0.0 {
                return Err(CacheError::Validation(format!(
                    "{} weight must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
