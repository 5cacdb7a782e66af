//! pattern-cache v0.5.0 - Pattern-Aware Knowledge Cache
//!
//! Learns recurring structure in a knowledge corpus and uses it to keep a
//! small, budget-bounded working set of items warm for each problem-solving
//! session.
//!
//! # Architecture
//!
//! - **Knowledge**: item model, repository contract, feedback channel
//! - **Patterns**: semantic clusters, temporal sequences, learning transitions
//! - **Prediction**: lexical and pattern-boosted ranking of items for a context
//! - **Cache**: per-session token budget with priority eviction
//! - **Session**: cache, history and usage accounting bound to a session id
//! - **Integration**: the service facade tying the pipeline together

pub mod errors;
pub mod config;
pub mod logging;
pub mod telemetry;

// Core pipeline
pub mod knowledge;
pub mod patterns;
pub mod prediction;
pub mod cache;
pub mod session;
pub mod integration;

// Re-export commonly used types
pub use errors::{CacheError, Result};
pub use config::EngineConfig;
pub use knowledge::{InMemoryRepository, ItemId, KnowledgeItem, KnowledgeKind, KnowledgeRepository};
pub use patterns::{Pattern, PatternDiscoveryEngine, PatternKind, PatternSet, PatternStore};
pub use prediction::{PredictionEngine, PredictionOptions, Recommendation};
pub use cache::{CacheBudget, CacheEngine, WarmReport};
pub use session::{SessionContext, SessionManager, SessionSummary};
pub use integration::{PatternCacheService, PrefetchOutcome};
pub use telemetry::{TelemetryCollector, TelemetryStats};
