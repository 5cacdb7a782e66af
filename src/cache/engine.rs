//! Bounded per-session cache
//!
//! Guarantee: `Σ token_cost ≤ budget` after every public call.
//!
//! - `warm` packs best-effort in descending confidence order and never
//!   evicts, except to shrink into a lowered budget
//! - `insert` (explicit fetch) evicts as needed
//! - `evict` frees space lowest priority first
//!
//! The engine is synchronous and owns its entries; callers serialize
//! access (one lock per session).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cache::counter::TokenCounter;
use crate::cache::eviction::eviction_queue;
use crate::cache::types::{
    CacheBudget, CacheEntry, CacheEvent, CacheState, CacheStats, EvictionOutcome, PriorityWeights, WarmCandidate,
    WarmReport,
};
use crate::errors::{CacheError, Result};
use crate::knowledge::types::{ItemId, KnowledgeItem};

/// Confidence assigned to explicitly fetched items
pub const EXPLICIT_FETCH_CONFIDENCE: f64 = 1.0;

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Per-session token budget (signed so misconfiguration is caught)
    pub budget_tokens: i64,

    /// Charge the 10% upper bound for each entry
    pub safety_margin: bool,

    /// Priority weights
    pub priority: PriorityWeights,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_tokens: 8_000,
            safety_margin: false,
            priority: PriorityWeights::default(),
        }
    }
}

impl CacheConfig {
    pub fn budget(&self) -> Result<CacheBudget> {
        CacheBudget::new(self.budget_tokens)
    }

    pub fn validate(&self) -> Result<()> {
        self.budget()?;
        let p = &self.priority;
        for (name, value) in [
            ("importance", p.importance),
            ("confidence", p.confidence),
            ("recency", p.recency),
            ("hits", p.hits),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CacheError::Validation(format!(
                    "{} priority weight must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !(p.recency_time_constant_minutes.is_finite() && p.recency_time_constant_minutes > 0.0) {
            return Err(CacheError::Validation(
                "recency_time_constant_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Bounded working set of one session
#[derive(Debug, Clone)]
pub struct CacheEngine {
    state: CacheState,
    budget: usize,
    used: usize,
    entries: HashMap<ItemId, CacheEntry>,
    counter: TokenCounter,
    weights: PriorityWeights,
    stats: CacheStats,
}

impl CacheEngine {
    /// Create an empty cache with default weights
    pub fn new(budget: CacheBudget) -> Self {
        Self {
            state: CacheState::Empty,
            budget: budget.tokens(),
            used: 0,
            entries: HashMap::new(),
            counter: TokenCounter::new(),
            weights: PriorityWeights::default(),
            stats: CacheStats::default(),
        }
    }

    /// Create an empty cache from validated configuration
    pub fn with_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let mut engine = Self::new(config.budget()?);
        engine.counter = TokenCounter::with_safety_margin(config.safety_margin);
        engine.weights = config.priority;
        Ok(engine)
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn used_tokens(&self) -> usize {
        self.used
    }

    pub fn remaining_tokens(&self) -> usize {
        self.budget - self.used
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn entry(&self, id: &str) -> Option<&CacheEntry> {
        self.entries.get(id)
    }

    /// Cached ids in ascending order
    pub fn cached_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Entries from highest to lowest priority (ties: most recent, then id)
    pub fn entries_by_priority(&self) -> Vec<&CacheEntry> {
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| b.last_accessed.cmp(&a.last_accessed))
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        entries
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            used_tokens: self.used,
            budget_tokens: self.budget,
            ..self.stats.clone()
        }
    }

    /// Token cost of an item under this cache's counter
    pub fn token_cost(&self, item: &KnowledgeItem) -> usize {
        self.counter.item_cost(item)
    }

    fn advance(&mut self, event: CacheEvent) -> Result<()> {
        self.state = self.state.transition(event)?;
        Ok(())
    }

    fn priority_at(&self, item: &KnowledgeItem, confidence: f64, last_accessed: DateTime<Utc>, hits: u64, now: DateTime<Utc>) -> f64 {
        let age_minutes = (now - last_accessed).num_milliseconds() as f64 / 60_000.0;
        self.weights.score(item, confidence, age_minutes, hits)
    }

    fn put(&mut self, item: KnowledgeItem, confidence: f64, token_cost: usize) {
        let now = Utc::now();
        let priority = self.priority_at(&item, confidence, now, 0, now);
        self.used += token_cost;
        self.stats.insertions += 1;
        self.entries.insert(
            item.id.clone(),
            CacheEntry {
                item,
                priority,
                token_cost,
                last_accessed: now,
                hit_count: 0,
                confidence,
            },
        );
    }

    fn remove(&mut self, id: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(id)?;
        self.used -= entry.token_cost;
        self.stats.evictions += 1;
        Some(entry)
    }

    /// Re-score every entry at `now` so recency decays between accesses
    fn refresh_priorities(&mut self, now: DateTime<Utc>) {
        let weights = self.weights;
        for entry in self.entries.values_mut() {
            let age_minutes = (now - entry.last_accessed).num_milliseconds() as f64 / 60_000.0;
            entry.priority = weights.score(&entry.item, entry.confidence, age_minutes, entry.hit_count);
        }
    }

    /// Evict lowest-priority entries until usage fits `limit`
    fn shrink_to(&mut self, limit: usize) -> EvictionOutcome {
        let mut outcome = EvictionOutcome::default();
        if self.used <= limit {
            return outcome;
        }

        self.refresh_priorities(Utc::now());
        let mut queue = eviction_queue(self.entries.values());
        while self.used > limit {
            let Some(candidate) = queue.pop() else { break };
            if let Some(entry) = self.remove(&candidate.id) {
                tracing::debug!(item = %candidate.id, priority = entry.priority, "evicted");
                outcome.freed_tokens += entry.token_cost;
                outcome.evicted.push(candidate.id);
            }
        }
        outcome
    }

    /// Populate from resolved recommendations
    ///
    /// Candidates are tried in descending confidence order (ties by id).
    /// Cached items are left untouched; an item that would overflow the
    /// remaining budget is skipped and later ones are still tried; an item
    /// costing more than the whole budget is reported as oversized.
    pub fn warm(&mut self, candidates: Vec<WarmCandidate>, budget: CacheBudget) -> Result<WarmReport> {
        self.advance(CacheEvent::BeginWarm)?;

        let mut report = WarmReport::default();
        self.budget = budget.tokens();
        let shrink = self.shrink_to(self.budget);
        report.evicted = shrink.evicted;

        let mut candidates = candidates;
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });

        for candidate in candidates {
            let id = candidate.item.id.clone();
            if self.entries.contains_key(&id) {
                report.already_cached.push(id);
                continue;
            }

            let cost = self.token_cost(&candidate.item);
            if cost > self.budget {
                tracing::warn!(item = %id, cost, budget = self.budget, "item larger than whole budget, skipped");
                self.stats.oversized += 1;
                report.oversized.push(id);
            } else if self.used + cost > self.budget {
                tracing::debug!(item = %id, cost, remaining = self.remaining_tokens(), "would overflow, skipped");
                self.stats.rejected += 1;
                report.skipped.push(id);
            } else {
                self.put(candidate.item, candidate.confidence, cost);
                report.inserted.push(id);
            }
        }

        self.advance(CacheEvent::FinishWarm)?;
        report.used_tokens = self.used;
        report.budget_tokens = self.budget;
        debug_assert!(self.used <= self.budget);
        Ok(report)
    }

    /// Look up an item; a hit refreshes recency, hit count and priority
    pub fn get(&mut self, id: &str) -> Result<Option<KnowledgeItem>> {
        self.advance(CacheEvent::Lookup)?;

        let now = Utc::now();
        let Some(entry) = self.entries.get(id) else {
            self.stats.misses += 1;
            return Ok(None);
        };

        let hits = entry.hit_count + 1;
        let priority = self.priority_at(&entry.item, entry.confidence, now, hits, now);

        let Some(entry) = self.entries.get_mut(id) else {
            return Ok(None);
        };
        entry.hit_count = hits;
        entry.last_accessed = now;
        entry.item.usage_count = entry.item.usage_count.saturating_add(1);
        entry.priority = priority;
        self.stats.hits += 1;

        Ok(Some(entry.item.clone()))
    }

    /// Free at least `required_tokens`, lowest priority first
    pub fn evict(&mut self, required_tokens: usize) -> Result<EvictionOutcome> {
        self.advance(CacheEvent::Evict)?;

        if required_tokens > self.budget {
            return Err(CacheError::Validation(format!(
                "cannot free {} tokens from a {}-token budget",
                required_tokens, self.budget
            )));
        }

        Ok(self.shrink_to(self.budget - required_tokens))
    }

    /// Cache an explicitly fetched item, evicting as needed
    pub fn insert(&mut self, item: KnowledgeItem, confidence: f64) -> Result<EvictionOutcome> {
        let next = self.state.transition(CacheEvent::Insert)?;

        let cost = self.token_cost(&item);
        if cost > self.budget {
            return Err(CacheError::BudgetExceeded {
                id: item.id,
                required: cost,
                budget: self.budget,
            });
        }

        self.state = next;
        if self.entries.contains_key(&item.id) {
            return Ok(EvictionOutcome::default());
        }

        let outcome = self.shrink_to(self.budget - cost);
        self.put(item, confidence, cost);
        debug_assert!(self.used <= self.budget);
        Ok(outcome)
    }

    /// Tear down: drop every entry and reject further calls
    pub fn close(&mut self) -> Result<Vec<CacheEntry>> {
        self.advance(CacheEvent::Close)?;
        self.used = 0;
        Ok(self.entries.drain().map(|(_, entry)| entry).collect())
    }
}
