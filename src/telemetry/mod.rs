//! Telemetry for the cache engine
//!
//! Collects discovery, prediction and cache events and keeps running
//! counters for external observability tooling. No wire format is implied:
//! callers read [`TelemetryStats`] and format it however they like.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Default number of retained events
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    // Discovery events
    DiscoveryCompleted {
        corpus_size: usize,
        patterns: usize,
        duration_ms: u64,
        timestamp: Instant,
    },
    DiscoveryFailed {
        error: String,
        timestamp: Instant,
    },

    // Prediction events
    RecommendationsProduced {
        count: usize,
        mean_confidence: f64,
        timestamp: Instant,
    },

    // Cache events
    CacheHit {
        session_id: String,
        item_id: String,
        timestamp: Instant,
    },
    CacheMiss {
        session_id: String,
        item_id: String,
        timestamp: Instant,
    },
    CacheWarmed {
        session_id: String,
        inserted: usize,
        skipped: usize,
        tokens_used: usize,
        timestamp: Instant,
    },
    Eviction {
        session_id: String,
        evicted: usize,
        freed_tokens: usize,
        timestamp: Instant,
    },

    // Session events
    FeedbackRecorded {
        item_id: String,
        delta: i32,
        timestamp: Instant,
    },
    SessionClosed {
        session_id: String,
        flushed_deltas: usize,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub discovery_runs: usize,
    pub discovery_failures: usize,
    pub last_discovery_ms: Option<u64>,
    pub last_corpus_size: Option<usize>,
    pub last_pattern_count: Option<usize>,
    pub recommendation_batches: usize,
    pub recommendations: usize,
    /// Sum of every recommendation's confidence
    pub confidence_sum: f64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub warms: usize,
    pub evictions: usize,
    pub evicted_entries: usize,
    pub feedback_events: usize,
    pub sessions_closed: usize,
}

/// Telemetry collector
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<VecDeque<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    capacity: usize,
    start_time: Instant,
}

impl TelemetryCollector {
    /// Create a new telemetry collector
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a collector retaining at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            capacity: capacity.max(1),
            start_time: Instant::now(),
        }
    }

    fn stats_guard(&self) -> MutexGuard<'_, TelemetryStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn events_guard(&self) -> MutexGuard<'_, VecDeque<TelemetryEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        // Update stats
        {
            let mut stats = self.stats_guard();
            match &event {
                TelemetryEvent::DiscoveryCompleted {
                    corpus_size,
                    patterns,
                    duration_ms,
                    ..
                } => {
                    stats.discovery_runs += 1;
                    stats.last_discovery_ms = Some(*duration_ms);
                    stats.last_corpus_size = Some(*corpus_size);
                    stats.last_pattern_count = Some(*patterns);
                }
                TelemetryEvent::DiscoveryFailed { .. } => {
                    stats.discovery_failures += 1;
                }
                TelemetryEvent::RecommendationsProduced {
                    count,
                    mean_confidence,
                    ..
                } => {
                    stats.recommendation_batches += 1;
                    stats.recommendations += count;
                    stats.confidence_sum += mean_confidence * *count as f64;
                }
                TelemetryEvent::CacheHit { .. } => {
                    stats.cache_hits += 1;
                }
                TelemetryEvent::CacheMiss { .. } => {
                    stats.cache_misses += 1;
                }
                TelemetryEvent::CacheWarmed { .. } => {
                    stats.warms += 1;
                }
                TelemetryEvent::Eviction { evicted, .. } => {
                    stats.evictions += 1;
                    stats.evicted_entries += evicted;
                }
                TelemetryEvent::FeedbackRecorded { .. } => {
                    stats.feedback_events += 1;
                }
                TelemetryEvent::SessionClosed { .. } => {
                    stats.sessions_closed += 1;
                }
            }
        }

        // Store event
        let mut events = self.events_guard();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> TelemetryStats {
        self.stats_guard().clone()
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Get retained event count
    pub fn event_count(&self) -> usize {
        self.events_guard().len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = self.events_guard();
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    /// Fraction of lookups served from cache, 0.0 before any lookup
    pub fn cache_hit_rate(&self) -> f64 {
        let stats = self.stats_guard();
        let total = stats.cache_hits + stats.cache_misses;
        if total == 0 {
            0.0
        } else {
            stats.cache_hits as f64 / total as f64
        }
    }

    /// Mean confidence over every recommendation produced
    pub fn average_confidence(&self) -> f64 {
        let stats = self.stats_guard();
        if stats.recommendations == 0 {
            0.0
        } else {
            stats.confidence_sum / stats.recommendations as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}
