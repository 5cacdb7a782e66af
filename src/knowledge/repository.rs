//! Repository boundary for the long-term knowledge store
//!
//! The store itself lives outside this crate. Every call may block on I/O,
//! so callers never hold a session lock across one.

use async_trait::async_trait;

use crate::errors::Result;
use crate::knowledge::types::{ItemFilter, ItemId, KnowledgeItem};

/// Durable store of knowledge items
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Nearest items by embedding similarity, best first
    async fn find_similar(&self, embedding: &[f32], top_k: usize) -> Result<Vec<KnowledgeItem>>;

    /// Items passing a kind/category/importance filter
    async fn find_by_filter(&self, filter: &ItemFilter) -> Result<Vec<KnowledgeItem>>;

    /// Monotonic usage counter bump (not idempotent)
    async fn increment_usage(&self, id: &ItemId) -> Result<()>;

    /// Fetch one item
    async fn get(&self, id: &ItemId) -> Result<KnowledgeItem>;

    /// Apply an external importance adjustment
    async fn adjust_importance(&self, id: &ItemId, delta: i32, reason: &str) -> Result<()>;

    /// Full corpus snapshot for batch discovery
    async fn load_corpus(&self) -> Result<Vec<KnowledgeItem>> {
        self.find_by_filter(&ItemFilter::all()).await
    }
}
