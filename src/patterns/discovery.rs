//! Pattern discovery engine
//!
//! Batch analysis of a corpus snapshot into semantic clusters, temporal
//! sequences and learning transitions. Pure over its input: the corpus is
//! never mutated and identical input yields identical patterns.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::errors::{CacheError, Result};
use crate::knowledge::types::{ItemId, KnowledgeItem};
use crate::patterns::clustering::{cluster_items, ClusterParams, ExcludedItem};
use crate::patterns::temporal::{learning_patterns, mine_transitions, sequence_patterns};
use crate::patterns::types::{cluster_confidence, Pattern, PatternCounts, PatternKind};

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Pairwise cosine similarity must exceed this to cluster
    pub similarity_threshold: f64,

    /// Smallest cluster kept in the output
    pub min_cluster_size: usize,

    /// Adjacent items further apart than this are not a transition
    pub window_minutes: u64,

    /// Occurrences needed for a transition pattern
    pub min_support: usize,

    /// Expected embedding length; inferred from the corpus when unset
    pub embedding_dimension: Option<usize>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            min_cluster_size: 3,
            window_minutes: 24 * 60,
            min_support: 2,
            embedding_dimension: None,
        }
    }
}

impl DiscoveryConfig {
    /// Reject thresholds and sizes the algorithms cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.similarity_threshold.is_finite() || !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(CacheError::Validation(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.min_cluster_size < 2 {
            return Err(CacheError::Validation(format!(
                "min_cluster_size must be at least 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.window_minutes == 0 {
            return Err(CacheError::Validation("window_minutes must be positive".to_string()));
        }
        if checked_window(self.window_minutes).is_none() {
            return Err(CacheError::Validation(format!(
                "window_minutes {} is outside the representable range",
                self.window_minutes
            )));
        }
        if self.min_support == 0 {
            return Err(CacheError::Validation("min_support must be positive".to_string()));
        }
        if self.embedding_dimension == Some(0) {
            return Err(CacheError::Validation("embedding_dimension must be positive".to_string()));
        }
        Ok(())
    }

    /// Transition window; saturates for unvalidated out-of-range values
    pub fn window(&self) -> Duration {
        checked_window(self.window_minutes).unwrap_or(Duration::MAX)
    }
}

fn checked_window(minutes: u64) -> Option<Duration> {
    Duration::try_minutes(i64::try_from(minutes).ok()?)
}

/// Summary of one discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    /// Distinct items analysed
    pub corpus_size: usize,
    /// Items excluded from clustering
    pub excluded: Vec<ExcludedItem>,
    /// Repeated ids dropped before analysis
    pub duplicate_ids: Vec<ItemId>,
    /// Items that ended up in a surviving cluster
    pub clustered_items: usize,
    pub counts: PatternCounts,
    pub duration: std::time::Duration,
}

/// Batch pattern discovery over corpus snapshots
#[derive(Debug, Clone, Default)]
pub struct PatternDiscoveryEngine {
    config: DiscoveryConfig,
}

impl PatternDiscoveryEngine {
    /// Create an engine with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with validated configuration
    pub fn with_config(config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover patterns in a corpus snapshot
    pub fn discover(&self, corpus: &[KnowledgeItem]) -> Result<Vec<Pattern>> {
        self.discover_with_report(corpus).map(|(patterns, _)| patterns)
    }

    /// Discover patterns and report what was analysed
    ///
    /// Output order: clusters (creation order), temporal sequences (kind
    /// order), learning transitions (efficiency descending).
    pub fn discover_with_report(&self, corpus: &[KnowledgeItem]) -> Result<(Vec<Pattern>, DiscoveryReport)> {
        self.config.validate()?;
        let started = Instant::now();

        if corpus.is_empty() {
            tracing::debug!("empty corpus, no patterns");
            return Ok((
                Vec::new(),
                DiscoveryReport {
                    duration: started.elapsed(),
                    ..DiscoveryReport::default()
                },
            ));
        }

        let (ordered, duplicate_ids) = canonical_order(corpus);
        let corpus_size = ordered.len();

        let outcome = cluster_items(
            &ordered,
            &ClusterParams {
                threshold: self.config.similarity_threshold,
                min_cluster_size: self.config.min_cluster_size,
                expected_dimension: self.config.embedding_dimension,
            },
        );

        let mut patterns: Vec<Pattern> = Vec::new();
        let mut clustered_items = 0;
        for cluster in outcome.clusters {
            let support = cluster.member_ids.len();
            clustered_items += support;
            patterns.push(Pattern::new(
                PatternKind::SemanticCluster {
                    mean_similarity: cluster.mean_similarity,
                },
                cluster.member_ids,
                support,
                cluster_confidence(support, corpus_size),
                0.0,
            ));
        }

        let table = mine_transitions(&ordered, self.config.window());
        patterns.extend(sequence_patterns(&table, self.config.min_support, corpus_size));
        patterns.extend(learning_patterns(&table, self.config.min_support, corpus_size));

        let report = DiscoveryReport {
            corpus_size,
            excluded: outcome.excluded,
            duplicate_ids,
            clustered_items,
            counts: PatternCounts::from_patterns(&patterns),
            duration: started.elapsed(),
        };

        tracing::info!(
            corpus_size,
            clusters = report.counts.semantic_clusters,
            sequences = report.counts.temporal_sequences,
            learning = report.counts.learning_transitions,
            excluded = report.excluded.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "pattern discovery finished"
        );

        Ok((patterns, report))
    }
}

/// Discover patterns with an explicit configuration
pub fn discover(corpus: &[KnowledgeItem], config: &DiscoveryConfig) -> Result<Vec<Pattern>> {
    PatternDiscoveryEngine::with_config(config.clone())?.discover(corpus)
}

/// Sort by (created_at, id) and drop repeated ids, keeping the first
fn canonical_order(corpus: &[KnowledgeItem]) -> (Vec<&KnowledgeItem>, Vec<ItemId>) {
    let mut ordered: Vec<&KnowledgeItem> = corpus.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    let mut unique = Vec::with_capacity(ordered.len());
    for item in ordered {
        if seen.insert(item.id.as_str()) {
            unique.push(item);
        } else {
            tracing::warn!(item = %item.id, "duplicate item id in corpus, keeping earliest");
            duplicates.push(item.id.clone());
        }
    }

    (unique, duplicates)
}
