//! Pattern discovery
//!
//! Components:
//! - Similarity: cosine similarity and embedding validation
//! - Clustering: complete-linkage semantic clusters
//! - Temporal: kind transitions and learning efficiency
//! - Discovery: the batch engine combining all three
//! - Store: the shared, atomically swapped pattern set

pub mod similarity;
pub mod types;
pub mod clustering;
pub mod temporal;
pub mod discovery;
pub mod store;

pub use types::{Pattern, PatternCounts, PatternId, PatternKind, PatternSet, TransitionOccurrence};
pub use discovery::{discover, DiscoveryConfig, DiscoveryReport, PatternDiscoveryEngine};
pub use store::PatternStore;
