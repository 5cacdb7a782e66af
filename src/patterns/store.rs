//! Process-wide pattern set
//!
//! Holds the latest discovery result as an immutable `Arc<PatternSet>`.
//! Readers clone the `Arc` under a short read lock; a finished run swaps in
//! a complete new set, so no reader ever sees a partial one.

use anyhow::Context;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::{CacheError, Result};
use crate::knowledge::repository::KnowledgeRepository;
use crate::patterns::discovery::{DiscoveryReport, PatternDiscoveryEngine};
use crate::patterns::types::{Pattern, PatternSet};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

/// Atomically swapped pattern snapshot
pub struct PatternStore {
    current: RwLock<Arc<PatternSet>>,
    generation: AtomicU64,
}

impl PatternStore {
    /// Store serving an empty set until the first run
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(PatternSet::empty())),
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<PatternSet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the whole set with a new run's output
    pub fn replace(&self, patterns: Vec<Pattern>, corpus_size: usize) -> Arc<PatternSet> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let set = Arc::new(PatternSet::new(generation, corpus_size, patterns));
        self.install(set.clone());
        set
    }

    fn install(&self, set: Arc<PatternSet>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = set;
    }

    /// Load the corpus, run discovery off the async workers and swap the result in
    ///
    /// On any failure the previous set stays in place.
    pub async fn refresh(
        &self,
        engine: &PatternDiscoveryEngine,
        repository: &dyn KnowledgeRepository,
    ) -> Result<DiscoveryReport> {
        let corpus = repository.load_corpus().await?;
        let engine = engine.clone();

        let (patterns, report) = tokio::task::spawn_blocking(move || engine.discover_with_report(&corpus))
            .await
            .map_err(|e| CacheError::Generic(format!("discovery task failed: {}", e)))??;

        let set = self.replace(patterns, report.corpus_size);
        tracing::debug!(generation = set.generation, patterns = set.len(), "pattern set swapped");
        Ok(report)
    }

    /// Refresh and record the outcome
    pub async fn refresh_recorded(
        &self,
        engine: &PatternDiscoveryEngine,
        repository: &dyn KnowledgeRepository,
        telemetry: &TelemetryCollector,
    ) -> Result<DiscoveryReport> {
        match self.refresh(engine, repository).await {
            Ok(report) => {
                telemetry.record(TelemetryEvent::DiscoveryCompleted {
                    corpus_size: report.corpus_size,
                    patterns: report.counts.total(),
                    duration_ms: report.duration.as_millis() as u64,
                    timestamp: Instant::now(),
                });
                Ok(report)
            }
            Err(e) => {
                telemetry.record(TelemetryEvent::DiscoveryFailed {
                    error: e.to_string(),
                    timestamp: Instant::now(),
                });
                Err(e)
            }
        }
    }

    /// Run discovery every `period` until `shutdown` flips to true or its sender drops
    pub fn spawn_refresh(
        self: Arc<Self>,
        engine: PatternDiscoveryEngine,
        repository: Arc<dyn KnowledgeRepository>,
        telemetry: TelemetryCollector,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh_recorded(&engine, repository.as_ref(), &telemetry).await {
                            if e.is_transient() {
                                tracing::warn!(error = %e, "discovery skipped, keeping previous pattern set");
                            } else {
                                tracing::error!(error = %e, "discovery run failed");
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("pattern refresh stopped");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Write the current snapshot as JSON
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create pattern snapshot directory")?;
        }
        let json = serde_json::to_string_pretty(snapshot.as_ref())?;
        fs::write(path, json).context("Failed to write pattern snapshot")?;
        Ok(())
    }

    /// Install a snapshot previously written with [`save_to`](Self::save_to)
    pub fn load_from(&self, path: &Path) -> Result<Arc<PatternSet>> {
        let json = fs::read_to_string(path).context("Failed to read pattern snapshot")?;
        let mut set: PatternSet = serde_json::from_str(&json)?;
        set.reindex();

        self.generation.fetch_max(set.generation, Ordering::SeqCst);
        let set = Arc::new(set);
        self.install(set.clone());
        Ok(set)
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory_repository::InMemoryRepository;
    use crate::knowledge::types::{KnowledgeItem, KnowledgeKind};

    fn clustered_repo() -> InMemoryRepository {
        InMemoryRepository::with_items(vec![
            KnowledgeItem::new("a", KnowledgeKind::Factual, "t", "c").with_embedding(vec![1.0, 0.0]),
            KnowledgeItem::new("b", KnowledgeKind::Factual, "t", "c").with_embedding(vec![0.99, 0.05]),
            KnowledgeItem::new("c", KnowledgeKind::Factual, "t", "c").with_embedding(vec![0.98, 0.1]),
        ])
    }

    #[test]
    fn test_replace_swaps_whole_set() {
        let store = PatternStore::new();
        let before = store.snapshot();
        assert!(before.is_empty());
        assert_eq!(before.generation, 0);

        store.replace(Vec::new(), 4);
        let after = store.snapshot();
        assert_eq!(after.generation, 1);
        assert_eq!(after.corpus_size, 4);

        // Old readers keep their snapshot
        assert_eq!(before.generation, 0);
    }

    #[tokio::test]
    async fn test_refresh_discovers_from_repository() {
        let store = PatternStore::new();
        let repo = clustered_repo();
        let telemetry = TelemetryCollector::new();

        let report = store
            .refresh_recorded(&PatternDiscoveryEngine::new(), &repo, &telemetry)
            .await
            .unwrap();

        assert_eq!(report.corpus_size, 3);
        assert_eq!(store.snapshot().counts().semantic_clusters, 1);
        assert_eq!(telemetry.get_stats().discovery_runs, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_set() {
        let store = PatternStore::new();
        let repo = clustered_repo();
        let engine = PatternDiscoveryEngine::new();
        store.refresh(&engine, &repo).await.unwrap();
        let discovered = store.snapshot().len();
        assert!(discovered > 0);

        repo.set_available(false);
        let err = store.refresh(&engine, &repo).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.snapshot().generation, 1);
        assert_eq!(store.snapshot().len(), discovered);
    }

    #[tokio::test]
    async fn test_spawn_refresh_stops_on_shutdown() {
        let store = Arc::new(PatternStore::new());
        let repo: Arc<dyn KnowledgeRepository> = Arc::new(clustered_repo());
        let (tx, rx) = watch::channel(false);

        let handle = store.clone().spawn_refresh(
            PatternDiscoveryEngine::new(),
            repo,
            TelemetryCollector::new(),
            Duration::from_millis(10),
            rx,
        );

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(store.snapshot().generation >= 1);
    }

    #[test]
    fn test_snapshot_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns").join("latest.json");

        let store = PatternStore::new();
        let engine = PatternDiscoveryEngine::new();
        let corpus: Vec<KnowledgeItem> = ["a", "b", "c"]
            .iter()
            .map(|id| KnowledgeItem::new(*id, KnowledgeKind::Factual, "t", "c").with_embedding(vec![1.0, 0.0]))
            .collect();
        let patterns = engine.discover(&corpus).unwrap();
        let expected = patterns.clone();
        store.replace(patterns, corpus.len());
        store.save_to(&path).unwrap();

        let restored = PatternStore::new();
        let set = restored.load_from(&path).unwrap();
        assert_eq!(set.generation, 1);
        assert_eq!(set.patterns(), expected.as_slice());
        assert_eq!(set.patterns_for("b").count(), expected.len());

        // Next run continues the generation sequence
        assert_eq!(restored.replace(Vec::new(), 0).generation, 2);
    }

    #[test]
    fn test_load_missing_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = PatternStore::new().load_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read pattern snapshot"));
    }
}
