//! Session context: one cache, one history, one redirection log
//!
//! All mutable session state sits behind a single async mutex. The lock is
//! never held across repository I/O: operations copy what they need,
//! release, perform the call, then re-acquire to commit.

use futures_util::future::join_all;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::cache::engine::{CacheEngine, EXPLICIT_FETCH_CONFIDENCE};
use crate::cache::types::{CacheBudget, CacheEvent, CacheStats, WarmCandidate, WarmReport};
use crate::errors::{CacheError, Result};
use crate::knowledge::feedback::{FeedbackEvent, FeedbackSender};
use crate::knowledge::repository::KnowledgeRepository;
use crate::knowledge::types::{ItemId, KnowledgeItem};
use crate::prediction::types::Recommendation;
use crate::session::assembly::{AssembledContext, ContextAssembler};
use crate::session::ledger::UsageLedger;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

/// State guarded by the session lock
struct SessionState {
    cache: CacheEngine,
    /// Items touched this session, oldest first, without repeats
    history: Vec<ItemId>,
    redirections: Vec<FeedbackEvent>,
}

impl SessionState {
    fn touch(&mut self, id: &str) {
        if !self.history.iter().any(|h| h == id) {
            self.history.push(id.to_string());
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.cache.state().is_closed() {
            // Produces the lifecycle error
            self.cache.state().transition(CacheEvent::Lookup)?;
        }
        Ok(())
    }
}

/// What a closed session leaves behind
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    /// Cache statistics at close
    pub stats: CacheStats,
    /// Items touched, oldest first
    pub history: Vec<ItemId>,
    /// Feedback recorded during the session
    pub redirections: Vec<FeedbackEvent>,
    /// Usage increments delivered during the close flush
    pub flushed_usage: u64,
    /// Usage increments the repository refused at close
    pub failed_usage: u64,
}

/// Session handle binding a cache to a session id
pub struct SessionContext {
    id: String,
    state: AsyncMutex<SessionState>,
    repository: Arc<dyn KnowledgeRepository>,
    ledger: Arc<UsageLedger>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    /// Dropped at close so the consumer can drain and stop
    feedback: Mutex<Option<FeedbackSender>>,
    assembler: ContextAssembler,
    telemetry: TelemetryCollector,
}

impl SessionContext {
    pub fn new(
        id: impl Into<String>,
        repository: Arc<dyn KnowledgeRepository>,
        cache: CacheEngine,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            id: id.into(),
            state: AsyncMutex::new(SessionState {
                cache,
                history: Vec::new(),
                redirections: Vec::new(),
            }),
            repository,
            ledger: Arc::new(UsageLedger::new()),
            in_flight: Mutex::new(Vec::new()),
            feedback: Mutex::new(None),
            assembler: ContextAssembler::new(),
            telemetry,
        }
    }

    /// Forward recorded feedback to a consumer
    pub fn with_feedback(self, feedback: FeedbackSender) -> Self {
        *self.feedback.lock().unwrap_or_else(PoisonError::into_inner) = Some(feedback);
        self
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolve recommendations and warm the cache
    ///
    /// Per-item repository failures are logged and skipped; the rest of the
    /// warm goes ahead.
    pub async fn warm(&self, recommendations: &[Recommendation], budget: CacheBudget) -> Result<WarmReport> {
        // Copy what is missing, then release the lock
        let (missing, cached) = {
            let state = self.state.lock().await;
            state.ensure_open()?;
            let mut missing: Vec<&Recommendation> = Vec::new();
            let mut cached: Vec<ItemId> = Vec::new();
            for rec in recommendations {
                if state.cache.contains(&rec.item_id) {
                    if !cached.contains(&rec.item_id) {
                        cached.push(rec.item_id.clone());
                    }
                } else if !missing.iter().any(|m| m.item_id == rec.item_id) {
                    missing.push(rec);
                }
            }
            (missing, cached)
        };

        let fetched = join_all(missing.iter().map(|rec| self.repository.get(&rec.item_id))).await;

        let mut candidates = Vec::with_capacity(fetched.len());
        let mut unresolved = Vec::new();
        for (rec, result) in missing.iter().zip(fetched) {
            match result {
                Ok(item) => candidates.push(WarmCandidate::new(item, rec.confidence)),
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(session = %self.id, item = %rec.item_id, error = %e, "repository unreachable, recommendation skipped");
                    } else {
                        tracing::warn!(session = %self.id, item = %rec.item_id, error = %e, "recommendation could not be resolved");
                    }
                    unresolved.push(rec.item_id.clone());
                }
            }
        }

        // Commit
        let mut report = {
            let mut state = self.state.lock().await;
            state.cache.warm(candidates, budget)?
        };
        for id in cached {
            if !report.already_cached.contains(&id) {
                report.already_cached.push(id);
            }
        }
        report.unresolved = unresolved;

        tracing::debug!(
            session = %self.id,
            inserted = report.inserted.len(),
            skipped = report.skipped.len(),
            used = report.used_tokens,
            budget = report.budget_tokens,
            "cache warmed"
        );
        self.telemetry.record(TelemetryEvent::CacheWarmed {
            session_id: self.id.clone(),
            inserted: report.inserted.len(),
            skipped: report.skipped.len() + report.oversized.len() + report.unresolved.len(),
            tokens_used: report.used_tokens,
            timestamp: Instant::now(),
        });
        if !report.evicted.is_empty() {
            self.telemetry.record(TelemetryEvent::Eviction {
                session_id: self.id.clone(),
                evicted: report.evicted.len(),
                freed_tokens: 0,
                timestamp: Instant::now(),
            });
        }

        Ok(report)
    }

    /// Warm, abandoning the attempt if `deadline` passes before commit
    ///
    /// An abandoned warm leaves the cache exactly as it was.
    pub async fn warm_within(
        &self,
        recommendations: &[Recommendation],
        budget: CacheBudget,
        deadline: Duration,
    ) -> Result<WarmReport> {
        match tokio::time::timeout(deadline, self.warm(recommendations, budget)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(session = %self.id, ?deadline, "warm abandoned at deadline");
                Err(CacheError::Cancelled(format!(
                    "warm for session {} exceeded {:?}",
                    self.id, deadline
                )))
            }
        }
    }

    /// Cache lookup; a hit schedules a usage increment without waiting for it
    pub async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>> {
        let hit = {
            let mut state = self.state.lock().await;
            let hit = state.cache.get(id)?;
            if hit.is_some() {
                state.touch(id);
                // Owed delta and its delivery task are registered together,
                // so a close that follows always joins the task first
                self.ledger.record(id);
                self.deliver_usage(id.to_string());
            }
            hit
        };

        match &hit {
            Some(_) => {
                self.telemetry.record(TelemetryEvent::CacheHit {
                    session_id: self.id.clone(),
                    item_id: id.to_string(),
                    timestamp: Instant::now(),
                });
            }
            None => {
                self.telemetry.record(TelemetryEvent::CacheMiss {
                    session_id: self.id.clone(),
                    item_id: id.to_string(),
                    timestamp: Instant::now(),
                });
            }
        }

        Ok(hit)
    }

    fn deliver_usage(&self, id: ItemId) {
        let repository = Arc::clone(&self.repository);
        let ledger = Arc::clone(&self.ledger);
        let session = self.id.clone();

        let handle = tokio::spawn(async move {
            match repository.increment_usage(&id).await {
                Ok(()) => ledger.acknowledge(&id),
                Err(e) => {
                    tracing::warn!(session = %session, item = %id, error = %e, "usage increment deferred to close");
                }
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Cached read with fallback to the repository on a miss
    pub async fn read(&self, id: &str) -> Result<KnowledgeItem> {
        if let Some(item) = self.get(id).await? {
            return Ok(item);
        }

        let item = self.repository.get(&id.to_string()).await?;

        let mut state = self.state.lock().await;
        let outcome = state.cache.insert(item.clone(), EXPLICIT_FETCH_CONFIDENCE)?;
        state.touch(id);
        drop(state);

        if !outcome.evicted.is_empty() {
            self.telemetry.record(TelemetryEvent::Eviction {
                session_id: self.id.clone(),
                evicted: outcome.evicted.len(),
                freed_tokens: outcome.freed_tokens,
                timestamp: Instant::now(),
            });
        }
        Ok(item)
    }

    /// Free at least `required_tokens` in this session's cache
    pub async fn evict(&self, required_tokens: usize) -> Result<Vec<ItemId>> {
        let outcome = self.state.lock().await.cache.evict(required_tokens)?;
        if !outcome.evicted.is_empty() {
            self.telemetry.record(TelemetryEvent::Eviction {
                session_id: self.id.clone(),
                evicted: outcome.evicted.len(),
                freed_tokens: outcome.freed_tokens,
                timestamp: Instant::now(),
            });
        }
        Ok(outcome.evicted)
    }

    /// Log a redirection/self-assessment signal and forward it
    ///
    /// Returns whether the event reached the feedback channel.
    pub async fn record_feedback(&self, item_id: &str, delta: i32, reason: &str) -> Result<bool> {
        let event = FeedbackEvent::new(item_id, delta, reason);
        {
            let mut state = self.state.lock().await;
            state.ensure_open()?;
            state.redirections.push(event.clone());
        }

        self.telemetry.record(TelemetryEvent::FeedbackRecorded {
            item_id: item_id.to_string(),
            delta,
            timestamp: Instant::now(),
        });

        let feedback = self.feedback.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(match feedback.as_ref() {
            Some(sender) => sender.send(event),
            None => false,
        })
    }

    /// Text context from cached items, highest priority first
    pub async fn assemble_context(&self, max_tokens: usize) -> Result<AssembledContext> {
        let state = self.state.lock().await;
        state.ensure_open()?;
        let entries = state.cache.entries_by_priority();
        Ok(self.assembler.build(&entries, Some(max_tokens)))
    }

    /// Items touched this session, oldest first
    pub async fn history(&self) -> Vec<ItemId> {
        self.state.lock().await.history.clone()
    }

    pub async fn redirections(&self) -> Vec<FeedbackEvent> {
        self.state.lock().await.redirections.clone()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.cache.stats()
    }

    pub async fn cached_ids(&self) -> Vec<ItemId> {
        self.state.lock().await.cache.cached_ids()
    }

    /// Usage increments not yet acknowledged by the repository
    pub fn outstanding_usage(&self) -> u64 {
        self.ledger.outstanding()
    }

    /// Flush usage deltas and discard the cache
    ///
    /// Waits for in-flight increments, re-sends whatever is still owed, then
    /// drops every entry. Later calls on this session fail.
    pub async fn close(&self) -> Result<SessionSummary> {
        let (stats, history, redirections) = {
            let mut state = self.state.lock().await;
            let stats = state.cache.stats();
            state.cache.close()?;
            (
                stats,
                std::mem::take(&mut state.history),
                std::mem::take(&mut state.redirections),
            )
        };

        self.feedback.lock().unwrap_or_else(PoisonError::into_inner).take();

        let handles: Vec<JoinHandle<()>> = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.drain(..).collect()
        };
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(session = %self.id, error = %e, "usage delivery task failed");
            }
        }

        let owed = self.ledger.drain();
        let increments = owed
            .iter()
            .flat_map(|(id, count)| std::iter::repeat(id).take(*count as usize))
            .map(|id| self.repository.increment_usage(id));
        let mut flushed_usage = 0;
        let mut failed_usage = 0;
        for result in join_all(increments).await {
            match result {
                Ok(()) => flushed_usage += 1,
                Err(e) => {
                    failed_usage += 1;
                    tracing::error!(session = %self.id, error = %e, "usage increment lost at close");
                }
            }
        }

        tracing::debug!(session = %self.id, flushed_usage, failed_usage, "session closed");
        self.telemetry.record(TelemetryEvent::SessionClosed {
            session_id: self.id.clone(),
            flushed_deltas: flushed_usage as usize,
            timestamp: Instant::now(),
        });

        Ok(SessionSummary {
            session_id: self.id.clone(),
            stats,
            history,
            redirections,
            flushed_usage,
            failed_usage,
        })
    }
}
