//! Knowledge items and the repository boundary
//!
//! Components:
//! - Types: knowledge items, kinds and repository filters
//! - Repository: async contract of the external knowledge store
//! - In-memory repository: reference store for tests and embedders
//! - Corpus index: keyword-indexed corpus snapshot for prediction
//! - Feedback: asynchronous importance adjustments

pub mod types;
pub mod repository;
pub mod memory_repository;
pub mod index;
pub mod feedback;

pub use types::{ItemFilter, ItemId, KnowledgeItem, KnowledgeKind, MAX_IMPORTANCE};
pub use repository::KnowledgeRepository;
pub use memory_repository::InMemoryRepository;
pub use index::CorpusIndex;
pub use feedback::{feedback_channel, spawn_feedback_consumer, FeedbackEvent, FeedbackSender};
