//! Bounded-budget session cache
//!
//! Components:
//! - Counter: token cost heuristic
//! - Types: entries, budget, lifecycle states, statistics
//! - Eviction: priority queue with a fixed tie-break order
//! - Engine: warm, get, evict and explicit insert

pub mod counter;
pub mod types;
pub mod eviction;
pub mod engine;

pub use counter::TokenCounter;
pub use engine::{CacheConfig, CacheEngine, EXPLICIT_FETCH_CONFIDENCE};
pub use types::{
    CacheBudget, CacheEntry, CacheEvent, CacheState, CacheStats, EvictionOutcome, PriorityWeights, WarmCandidate,
    WarmReport,
};
