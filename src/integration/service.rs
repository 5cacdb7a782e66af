//! Service facade wiring the engine together
//!
//! Data flow: repository → discovery → pattern set → prediction → session
//! cache → consuming caller. One service per process; sessions are opened
//! and closed through it.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::engine::CacheEngine;
use crate::cache::types::{CacheBudget, WarmReport};
use crate::config::EngineConfig;
use crate::errors::{CacheError, Result};
use crate::knowledge::feedback::{
    feedback_channel, spawn_feedback_consumer, FeedbackSender, FeedbackStats, DEFAULT_FEEDBACK_CAPACITY,
};
use crate::knowledge::index::CorpusIndex;
use crate::knowledge::repository::KnowledgeRepository;
use crate::knowledge::types::KnowledgeItem;
use crate::patterns::discovery::{DiscoveryReport, PatternDiscoveryEngine};
use crate::patterns::store::PatternStore;
use crate::patterns::types::PatternSet;
use crate::prediction::engine::PredictionEngine;
use crate::prediction::types::Recommendation;
use crate::session::assembly::{AssembledContext, ContextAssembler};
use crate::session::context::{SessionContext, SessionSummary};
use crate::session::manager::SessionManager;
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

/// Recommendations and what the warm did with them
#[derive(Debug, Clone, Default)]
pub struct PrefetchOutcome {
    pub recommendations: Vec<Recommendation>,
    pub report: WarmReport,
    /// Corpus could not be loaded; the session kept its existing cache
    pub degraded: bool,
}

/// What shutdown leaves behind
#[derive(Debug, Clone, Default)]
pub struct ShutdownSummary {
    pub sessions: Vec<SessionSummary>,
    pub feedback: FeedbackStats,
}

struct RefreshTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Pattern-aware cache service
pub struct PatternCacheService {
    config: EngineConfig,
    repository: Arc<dyn KnowledgeRepository>,
    patterns: Arc<PatternStore>,
    discovery: PatternDiscoveryEngine,
    prediction: PredictionEngine,
    sessions: SessionManager,
    telemetry: TelemetryCollector,
    feedback: Mutex<Option<FeedbackSender>>,
    consumer: Mutex<Option<JoinHandle<FeedbackStats>>>,
    refresh: Mutex<Option<RefreshTask>>,
}

impl PatternCacheService {
    /// Create the service and start the feedback consumer
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: EngineConfig, repository: Arc<dyn KnowledgeRepository>) -> Result<Self> {
        config.validate()?;

        let discovery = PatternDiscoveryEngine::with_config(config.discovery.clone())?;
        let prediction = PredictionEngine::with_options(config.prediction.clone())?;
        let (feedback, rx) = feedback_channel(DEFAULT_FEEDBACK_CAPACITY);
        let consumer = spawn_feedback_consumer(Arc::clone(&repository), rx);

        tracing::info!(
            budget_tokens = config.cache.budget_tokens,
            similarity_threshold = config.discovery.similarity_threshold,
            confidence_threshold = config.prediction.confidence_threshold,
            "pattern cache service started"
        );

        Ok(Self {
            telemetry: TelemetryCollector::with_capacity(config.telemetry.event_capacity),
            config,
            repository,
            patterns: Arc::new(PatternStore::new()),
            discovery,
            prediction,
            sessions: SessionManager::new(),
            feedback: Mutex::new(Some(feedback)),
            consumer: Mutex::new(Some(consumer)),
            refresh: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Current pattern snapshot
    pub fn patterns(&self) -> Arc<PatternSet> {
        self.patterns.snapshot()
    }

    /// Run discovery now and swap in the result
    pub async fn run_discovery(&self) -> Result<DiscoveryReport> {
        self.patterns
            .refresh_recorded(&self.discovery, self.repository.as_ref(), &self.telemetry)
            .await
    }

    /// Start periodic discovery at the configured interval
    pub fn start_refresh(&self) -> Result<()> {
        let mut refresh = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if refresh.is_some() {
            return Err(CacheError::Validation("pattern refresh already running".to_string()));
        }

        let period = Duration::from_secs(self.config.telemetry.refresh_interval_secs);
        let (stop, shutdown) = watch::channel(false);
        let handle = Arc::clone(&self.patterns).spawn_refresh(
            self.discovery.clone(),
            Arc::clone(&self.repository),
            self.telemetry.clone(),
            period,
            shutdown,
        );
        *refresh = Some(RefreshTask { stop, handle });
        tracing::debug!(?period, "pattern refresh scheduled");
        Ok(())
    }

    /// Stop periodic discovery, waiting for a run in progress
    pub async fn stop_refresh(&self) {
        let task = self.refresh.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            let _ = task.stop.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!(error = %e, "pattern refresh task failed");
            }
        }
    }

    /// Persist the current pattern set
    pub fn save_patterns(&self, path: &Path) -> Result<()> {
        self.patterns.save_to(path)
    }

    /// Restore a persisted pattern set
    pub fn load_patterns(&self, path: &Path) -> Result<Arc<PatternSet>> {
        self.patterns.load_from(path)
    }

    /// Open a session under a fresh id
    pub async fn open_session(&self) -> Result<Arc<SessionContext>> {
        self.open_session_with_id(&Uuid::new_v4().to_string()).await
    }

    /// Open a session under a caller-chosen id
    pub async fn open_session_with_id(&self, id: &str) -> Result<Arc<SessionContext>> {
        if id.trim().is_empty() {
            return Err(CacheError::Validation("session id must not be empty".to_string()));
        }

        let cache = CacheEngine::with_config(&self.config.cache)?;
        let mut session = SessionContext::new(id, Arc::clone(&self.repository), cache, self.telemetry.clone())
            .with_assembler(ContextAssembler::with_config(self.config.context.clone()));
        let feedback = self.feedback.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(sender) = feedback {
            session = session.with_feedback(sender);
        }

        self.sessions.register(session).await
    }

    pub async fn session(&self, id: &str) -> Result<Arc<SessionContext>> {
        self.sessions.get(id).await
    }

    /// Rank items for a session's context against the current pattern set
    pub async fn recommend(&self, session_id: &str, context_text: &str) -> Result<Vec<Recommendation>> {
        let session = self.sessions.get(session_id).await?;
        let corpus = self.repository.load_corpus().await?;
        self.rank(&session, context_text, corpus).await
    }

    async fn rank(
        &self,
        session: &SessionContext,
        context_text: &str,
        corpus: Vec<KnowledgeItem>,
    ) -> Result<Vec<Recommendation>> {
        let index = CorpusIndex::from_items(corpus);
        let history = session.history().await;
        let patterns = self.patterns.snapshot();

        let recommendations = self.prediction.predict(context_text, &history, &patterns, &index)?;

        let mean_confidence = if recommendations.is_empty() {
            0.0
        } else {
            recommendations.iter().map(|r| r.confidence).sum::<f64>() / recommendations.len() as f64
        };
        self.telemetry.record(TelemetryEvent::RecommendationsProduced {
            count: recommendations.len(),
            mean_confidence,
            timestamp: Instant::now(),
        });
        tracing::debug!(
            session = %session.id(),
            count = recommendations.len(),
            generation = patterns.generation,
            "recommendations ranked"
        );
        Ok(recommendations)
    }

    /// Predict for the context and warm the session cache with the result
    ///
    /// An unreachable repository degrades to the existing cache instead of
    /// failing the call.
    pub async fn prefetch(&self, session_id: &str, context_text: &str) -> Result<PrefetchOutcome> {
        let session = self.sessions.get(session_id).await?;
        let budget = self.config.cache.budget()?;

        let corpus = match self.repository.load_corpus().await {
            Ok(corpus) => corpus,
            Err(e) if e.is_transient() => {
                tracing::error!(session = %session_id, error = %e, "corpus unavailable, serving existing cache");
                return Ok(PrefetchOutcome {
                    degraded: true,
                    ..PrefetchOutcome::default()
                });
            }
            Err(e) => return Err(e),
        };

        let recommendations = self.rank(&session, context_text, corpus).await?;
        let report = session.warm(&recommendations, budget).await?;
        Ok(PrefetchOutcome {
            recommendations,
            report,
            degraded: false,
        })
    }

    /// Prefetch, abandoning the attempt when `deadline` passes before commit
    pub async fn prefetch_within(
        &self,
        session_id: &str,
        context_text: &str,
        deadline: Duration,
    ) -> Result<PrefetchOutcome> {
        tokio::time::timeout(deadline, self.prefetch(session_id, context_text))
            .await
            .map_err(|_| {
                tracing::warn!(session = %session_id, ?deadline, "prefetch abandoned at deadline");
                CacheError::Cancelled(format!("prefetch for session {} exceeded {:?}", session_id, deadline))
            })?
    }

    /// Warm a session with an explicit budget
    pub async fn warm(
        &self,
        session_id: &str,
        recommendations: &[Recommendation],
        budget: CacheBudget,
    ) -> Result<WarmReport> {
        self.sessions.get(session_id).await?.warm(recommendations, budget).await
    }

    /// Cache lookup only
    pub async fn get(&self, session_id: &str, item_id: &str) -> Result<Option<KnowledgeItem>> {
        self.sessions.get(session_id).await?.get(item_id).await
    }

    /// Cached read with repository fallback
    pub async fn read(&self, session_id: &str, item_id: &str) -> Result<KnowledgeItem> {
        self.sessions.get(session_id).await?.read(item_id).await
    }

    pub async fn record_feedback(&self, session_id: &str, item_id: &str, delta: i32, reason: &str) -> Result<bool> {
        self.sessions
            .get(session_id)
            .await?
            .record_feedback(item_id, delta, reason)
            .await
    }

    /// Assemble context at the configured token limit unless overridden
    pub async fn assemble_context(&self, session_id: &str, max_tokens: Option<usize>) -> Result<AssembledContext> {
        let limit = max_tokens.unwrap_or(self.config.context.max_context_tokens);
        self.sessions.get(session_id).await?.assemble_context(limit).await
    }

    pub async fn close_session(&self, session_id: &str) -> Result<SessionSummary> {
        self.sessions.close(session_id).await
    }

    /// Close every session, stop background work and drain pending feedback
    pub async fn shutdown(&self) -> ShutdownSummary {
        self.stop_refresh().await;
        let sessions = self.sessions.close_all().await;

        self.feedback.lock().unwrap_or_else(PoisonError::into_inner).take();
        let consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner).take();
        let feedback = match consumer {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                tracing::error!(error = %e, "feedback consumer failed");
                FeedbackStats::default()
            }),
            None => FeedbackStats::default(),
        };

        tracing::info!(
            sessions = sessions.len(),
            feedback_applied = feedback.applied,
            feedback_failed = feedback.failed,
            "pattern cache service stopped"
        );
        ShutdownSummary { sessions, feedback }
    }
}
