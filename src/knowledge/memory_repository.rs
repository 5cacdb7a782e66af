//! In-memory knowledge repository
//!
//! Reference implementation of [`KnowledgeRepository`] for tests and for
//! embedders without a durable store. An availability switch simulates an
//! unreachable backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::errors::{CacheError, Result};
use crate::knowledge::repository::KnowledgeRepository;
use crate::knowledge::types::{ItemFilter, ItemId, KnowledgeItem, MAX_IMPORTANCE};
use crate::patterns::similarity::cosine_similarity;

/// Record of an applied importance adjustment
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedAdjustment {
    pub item_id: ItemId,
    pub delta: i32,
    pub reason: String,
    pub old_importance: u8,
    pub new_importance: u8,
}

/// Knowledge repository backed by a map
pub struct InMemoryRepository {
    items: RwLock<HashMap<ItemId, KnowledgeItem>>,
    adjustments: RwLock<Vec<AppliedAdjustment>>,
    available: AtomicBool,
    calls: AtomicU64,
}

impl InMemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            adjustments: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
            calls: AtomicU64::new(0),
        }
    }

    /// Create a repository seeded with items
    pub fn with_items(items: impl IntoIterator<Item = KnowledgeItem>) -> Self {
        let map = items.into_iter().map(|item| (item.id.clone(), item)).collect();
        Self {
            items: RwLock::new(map),
            ..Self::new()
        }
    }

    /// Insert or replace an item
    pub async fn upsert(&self, item: KnowledgeItem) {
        self.items.write().await.insert(item.id.clone(), item);
    }

    /// Toggle simulated availability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored items
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Check if the repository is empty
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Current usage counter of an item
    pub async fn usage_of(&self, id: &str) -> Option<u64> {
        self.items.read().await.get(id).map(|item| item.usage_count)
    }

    /// Current importance of an item
    pub async fn importance_of(&self, id: &str) -> Option<u8> {
        self.items.read().await.get(id).map(|item| item.importance)
    }

    /// Adjustments applied so far, oldest first
    pub async fn adjustments(&self) -> Vec<AppliedAdjustment> {
        self.adjustments.read().await.clone()
    }

    /// Total calls served (including failed ones)
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn ensure_available(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::TransientStore(
                "in-memory repository marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryRepository {
    async fn find_similar(&self, embedding: &[f32], top_k: usize) -> Result<Vec<KnowledgeItem>> {
        self.ensure_available()?;
        if embedding.is_empty() {
            return Err(CacheError::Validation("query embedding is empty".to_string()));
        }

        let items = self.items.read().await;
        let mut scored: Vec<(f64, &KnowledgeItem)> = items
            .values()
            .filter(|item| item.embedding.len() == embedding.len())
            .map(|item| (cosine_similarity(embedding, &item.embedding), item))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn find_by_filter(&self, filter: &ItemFilter) -> Result<Vec<KnowledgeItem>> {
        self.ensure_available()?;
        let items = self.items.read().await;
        let mut matched: Vec<KnowledgeItem> = items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn increment_usage(&self, id: &ItemId) -> Result<()> {
        self.ensure_available()?;
        let mut items = self.items.write().await;
        let item = items.get_mut(id).ok_or_else(|| CacheError::not_found(id.clone()))?;
        item.usage_count = item.usage_count.saturating_add(1);
        Ok(())
    }

    async fn get(&self, id: &ItemId) -> Result<KnowledgeItem> {
        self.ensure_available()?;
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::not_found(id.clone()))
    }

    async fn adjust_importance(&self, id: &ItemId, delta: i32, reason: &str) -> Result<()> {
        self.ensure_available()?;
        let mut items = self.items.write().await;
        let item = items.get_mut(id).ok_or_else(|| CacheError::not_found(id.clone()))?;

        let old_importance = item.importance;
        let adjusted = (i32::from(old_importance) + delta).clamp(0, i32::from(MAX_IMPORTANCE));
        item.importance = adjusted as u8;

        self.adjustments.write().await.push(AppliedAdjustment {
            item_id: id.clone(),
            delta,
            reason: reason.to_string(),
            old_importance,
            new_importance: item.importance,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::KnowledgeKind;

    fn item(id: &str, embedding: Vec<f32>) -> KnowledgeItem {
        KnowledgeItem::new(id, KnowledgeKind::Factual, id, "content").with_embedding(embedding)
    }

    #[tokio::test]
    async fn test_find_similar_orders_by_cosine() {
        let repo = InMemoryRepository::with_items(vec![
            item("far", vec![0.0, 1.0]),
            item("near", vec![1.0, 0.1]),
            item("exact", vec![1.0, 0.0]),
            item("wrong_dim", vec![1.0, 0.0, 0.0]),
        ]);

        let found = repo.find_similar(&[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
    }

    #[tokio::test]
    async fn test_unavailable_is_transient() {
        let repo = InMemoryRepository::with_items(vec![item("a", vec![1.0])]);
        repo.set_available(false);

        let err = repo.get(&"a".to_string()).await.unwrap_err();
        assert!(err.is_transient());

        repo.set_available(true);
        assert!(repo.get(&"a".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_increment_usage_is_monotonic() {
        let repo = InMemoryRepository::with_items(vec![item("a", vec![1.0])]);
        let id = "a".to_string();
        repo.increment_usage(&id).await.unwrap();
        repo.increment_usage(&id).await.unwrap();
        assert_eq!(repo.usage_of("a").await, Some(2));

        let missing = repo.increment_usage(&"nope".to_string()).await.unwrap_err();
        assert!(matches!(missing, CacheError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_adjust_importance_clamps() {
        let repo = InMemoryRepository::with_items(vec![item("a", vec![1.0]).with_importance(90)]);
        let id = "a".to_string();

        repo.adjust_importance(&id, 30, "redirected twice").await.unwrap();
        assert_eq!(repo.importance_of("a").await, Some(100));

        repo.adjust_importance(&id, -150, "wrong answer").await.unwrap();
        assert_eq!(repo.importance_of("a").await, Some(0));

        let log = repo.adjustments().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].old_importance, 90);
        assert_eq!(log[0].new_importance, 100);
        assert_eq!(log[1].reason, "wrong answer");
    }

    #[tokio::test]
    async fn test_load_corpus_returns_everything_sorted() {
        let repo = InMemoryRepository::with_items(vec![item("b", vec![]), item("a", vec![])]);
        let corpus = repo.load_corpus().await.unwrap();
        let ids: Vec<&str> = corpus.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
