//! Cache entries, budget, lifecycle and statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, Result};
use crate::knowledge::types::{ItemId, KnowledgeItem};

/// Token budget of one session cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheBudget(usize);

impl CacheBudget {
    /// Validate a signed budget from configuration or callers
    pub fn new(tokens: i64) -> Result<Self> {
        usize::try_from(tokens)
            .map(Self)
            .map_err(|_| CacheError::Validation(format!("cache budget must not be negative, got {}", tokens)))
    }

    pub fn tokens(&self) -> usize {
        self.0
    }
}

impl From<usize> for CacheBudget {
    fn from(tokens: usize) -> Self {
        Self(tokens)
    }
}

/// Cache lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheState {
    /// Nothing cached yet
    Empty,
    /// A warm is being applied
    Warming,
    /// Serving lookups
    Ready,
    /// Session torn down (terminal)
    Closed,
}

/// Events driving the cache lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    BeginWarm,
    FinishWarm,
    Lookup,
    Insert,
    Evict,
    Close,
}

impl CacheState {
    pub fn is_closed(&self) -> bool {
        matches!(self, CacheState::Closed)
    }

    /// Attempt a state transition
    ///
    /// Valid transitions:
    /// 1. Empty | Ready   → Warming  (on: BeginWarm)
    /// 2. Warming         → Ready    (on: FinishWarm)
    /// 3. Empty | Ready   → same     (on: Lookup | Evict)
    /// 4. Empty | Ready   → Ready    (on: Insert)
    /// 5. non-Closed      → Closed   (on: Close)
    ///
    /// Everything else, and any event after Closed, is rejected.
    pub fn transition(&self, event: CacheEvent) -> Result<CacheState> {
        use CacheEvent::*;
        use CacheState::*;

        let next = match (self, event) {
            (Empty | Ready, BeginWarm) => Warming,
            (Warming, FinishWarm) => Ready,
            (Empty, Lookup | Evict) => Empty,
            (Ready, Lookup | Evict) => Ready,
            (Empty | Ready, Insert) => Ready,
            (Empty | Warming | Ready, Close) => Closed,
            (from, event) => {
                return Err(CacheError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                });
            }
        };
        Ok(next)
    }
}

/// Priority weights for cached entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub importance: f64,
    pub confidence: f64,
    pub recency: f64,
    pub hits: f64,
    /// Recency decays as exp(-age / this)
    pub recency_time_constant_minutes: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            importance: 0.4,
            confidence: 0.3,
            recency: 0.2,
            hits: 0.1,
            recency_time_constant_minutes: 30.0,
        }
    }
}

impl PriorityWeights {
    /// Priority from importance, confidence, recency and hit count
    ///
    /// ```text
    /// p = w_i * importance/100 + w_c * confidence
    ///   + w_r * exp(-age_minutes / tau) + w_h * (1 - exp(-hits / 5))
    /// ```
    pub fn score(&self, item: &KnowledgeItem, confidence: f64, age_minutes: f64, hits: u64) -> f64 {
        let tau = self.recency_time_constant_minutes.max(f64::EPSILON);
        let recency = (-age_minutes.max(0.0) / tau).exp();
        let hit_factor = 1.0 - (-(hits as f64) / 5.0).exp();

        self.importance * item.normalized_importance()
            + self.confidence * confidence.clamp(0.0, 1.0)
            + self.recency * recency
            + self.hits * hit_factor
    }
}

/// One cached item
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Snapshot taken when the entry was created
    pub item: KnowledgeItem,
    pub priority: f64,
    pub token_cost: usize,
    pub last_accessed: DateTime<Utc>,
    pub hit_count: u64,
    /// Confidence of the recommendation (1.0 for explicit fetches)
    pub confidence: f64,
}

/// Recommendation already resolved into an item
#[derive(Debug, Clone, PartialEq)]
pub struct WarmCandidate {
    pub item: KnowledgeItem,
    pub confidence: f64,
}

impl WarmCandidate {
    pub fn new(item: KnowledgeItem, confidence: f64) -> Self {
        Self { item, confidence }
    }
}

/// Outcome of one warm
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarmReport {
    /// Newly cached, in insertion order
    pub inserted: Vec<ItemId>,
    /// Left untouched because they were cached already
    pub already_cached: Vec<ItemId>,
    /// Would have overflowed the remaining budget
    pub skipped: Vec<ItemId>,
    /// Cost alone exceeds the whole budget
    pub oversized: Vec<ItemId>,
    /// Evicted because the budget shrank below current usage
    pub evicted: Vec<ItemId>,
    /// Could not be resolved from the repository
    pub unresolved: Vec<ItemId>,
    pub used_tokens: usize,
    pub budget_tokens: usize,
}

/// Entries removed by an eviction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionOutcome {
    pub evicted: Vec<ItemId>,
    pub freed_tokens: usize,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    /// Warm candidates skipped for overflow
    pub rejected: u64,
    pub oversized: u64,
    pub entries: usize,
    pub used_tokens: usize,
    pub budget_tokens: usize,
}

impl CacheStats {
    /// Hit rate, 0.0 before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::KnowledgeKind;

    #[test]
    fn test_negative_budget_rejected() {
        assert!(matches!(CacheBudget::new(-1), Err(CacheError::Validation(_))));
        assert_eq!(CacheBudget::new(0).unwrap().tokens(), 0);
        assert_eq!(CacheBudget::new(100).unwrap().tokens(), 100);
    }

    #[test]
    fn test_valid_lifecycle() {
        let state = CacheState::Empty;
        let state = state.transition(CacheEvent::BeginWarm).unwrap();
        assert_eq!(state, CacheState::Warming);
        let state = state.transition(CacheEvent::FinishWarm).unwrap();
        assert_eq!(state, CacheState::Ready);
        assert_eq!(state.transition(CacheEvent::Lookup).unwrap(), CacheState::Ready);
        assert_eq!(state.transition(CacheEvent::Close).unwrap(), CacheState::Closed);
        assert_eq!(
            CacheState::Empty.transition(CacheEvent::Insert).unwrap(),
            CacheState::Ready
        );
    }

    #[test]
    fn test_closed_rejects_everything() {
        for event in [
            CacheEvent::BeginWarm,
            CacheEvent::FinishWarm,
            CacheEvent::Lookup,
            CacheEvent::Insert,
            CacheEvent::Evict,
            CacheEvent::Close,
        ] {
            let err = CacheState::Closed.transition(event).unwrap_err();
            assert!(matches!(err, CacheError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn test_warming_only_finishes_or_closes() {
        assert!(CacheState::Warming.transition(CacheEvent::Lookup).is_err());
        assert!(CacheState::Ready.transition(CacheEvent::FinishWarm).is_err());
    }

    #[test]
    fn test_priority_components() {
        let weights = PriorityWeights::default();
        let low = KnowledgeItem::new("a", KnowledgeKind::Factual, "t", "c").with_importance(0);
        let high = low.clone().with_importance(100);

        let base = weights.score(&low, 0.0, 1e9, 0);
        assert!(base.abs() < 1e-9);
        assert!((weights.score(&high, 0.0, 1e9, 0) - 0.4).abs() < 1e-9);
        assert!((weights.score(&low, 1.0, 1e9, 0) - 0.3).abs() < 1e-9);
        assert!((weights.score(&low, 0.0, 0.0, 0) - 0.2).abs() < 1e-9);

        // More hits and fresher access never lower priority
        assert!(weights.score(&low, 0.5, 10.0, 3) > weights.score(&low, 0.5, 10.0, 2));
        assert!(weights.score(&low, 0.5, 5.0, 2) > weights.score(&low, 0.5, 10.0, 2));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 1e-12);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
