//! Feedback channel: importance adjustments from redirection/self-assessment
//!
//! Adjustments are delivered as messages and applied by a consumer task at
//! the repository boundary. Producers never wait on the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::knowledge::repository::KnowledgeRepository;
use crate::knowledge::types::ItemId;

/// Default channel capacity
pub const DEFAULT_FEEDBACK_CAPACITY: usize = 256;

/// One importance adjustment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// Target item
    pub item_id: ItemId,
    /// Signed importance delta
    pub delta: i32,
    /// Human-readable trigger
    pub reason: String,
    /// When the signal was recorded
    pub recorded_at: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(item_id: impl Into<ItemId>, delta: i32, reason: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            delta,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Outcome of a consumer run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackStats {
    pub applied: usize,
    pub failed: usize,
}

/// Producer side of the feedback channel
#[derive(Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<FeedbackEvent>,
}

impl FeedbackSender {
    /// Queue an event without waiting. Returns false when the channel is
    /// full or closed.
    pub fn send(&self, event: FeedbackEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(item = %event.item_id, "feedback channel full, dropping adjustment");
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(item = %event.item_id, "feedback channel closed, dropping adjustment");
                false
            }
        }
    }
}

/// Create a bounded feedback channel
pub fn feedback_channel(capacity: usize) -> (FeedbackSender, mpsc::Receiver<FeedbackEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FeedbackSender { tx }, rx)
}

/// Spawn the consumer that applies adjustments until every sender is dropped
pub fn spawn_feedback_consumer(
    repository: Arc<dyn KnowledgeRepository>,
    mut rx: mpsc::Receiver<FeedbackEvent>,
) -> JoinHandle<FeedbackStats> {
    tokio::spawn(async move {
        let mut stats = FeedbackStats::default();
        while let Some(event) = rx.recv().await {
            match repository
                .adjust_importance(&event.item_id, event.delta, &event.reason)
                .await
            {
                Ok(()) => {
                    tracing::debug!(item = %event.item_id, delta = event.delta, "importance adjusted");
                    stats.applied += 1;
                }
                Err(e) => {
                    tracing::error!(item = %event.item_id, error = %e, "failed to apply importance adjustment");
                    stats.failed += 1;
                }
            }
        }
        stats
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory_repository::InMemoryRepository;
    use crate::knowledge::types::{KnowledgeItem, KnowledgeKind};

    #[tokio::test]
    async fn test_consumer_applies_events() {
        let repo = Arc::new(InMemoryRepository::with_items(vec![KnowledgeItem::new(
            "a",
            KnowledgeKind::Factual,
            "t",
            "c",
        )
        .with_importance(40)]));

        let (sender, rx) = feedback_channel(8);
        let handle = spawn_feedback_consumer(repo.clone(), rx);

        assert!(sender.send(FeedbackEvent::new("a", 15, "user redirected")));
        assert!(sender.send(FeedbackEvent::new("missing", 5, "stale id")));
        drop(sender);

        let stats = handle.await.unwrap();
        assert_eq!(stats, FeedbackStats { applied: 1, failed: 1 });
        assert_eq!(repo.importance_of("a").await, Some(55));
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (sender, _rx) = feedback_channel(1);
        assert!(sender.send(FeedbackEvent::new("a", 1, "first")));
        assert!(!sender.send(FeedbackEvent::new("a", 1, "second")));
    }
}
