//! Pattern records and the immutable pattern-set snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::knowledge::types::{ItemId, KnowledgeKind};

/// Namespace for deterministic pattern ids
const PATTERN_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d5_4b7a_8e21_5c0d_7f3a_b914);

/// Deterministic pattern identifier (UUID v5 over kind and members)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    /// Derive an id from a kind key and the member ids
    pub fn derive(kind_key: &str, member_ids: &[ItemId]) -> Self {
        let mut name = String::with_capacity(kind_key.len() + member_ids.len() * 16);
        name.push_str(kind_key);
        for id in member_ids {
            name.push('\u{1f}');
            name.push_str(id);
        }
        Self(Uuid::new_v5(&PATTERN_NAMESPACE, name.as_bytes()))
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One observed adjacent pair backing a transition pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOccurrence {
    /// Earlier item
    pub from_id: ItemId,
    /// Later item
    pub to_id: ItemId,
    /// importance(to) - importance(from)
    pub importance_delta: i32,
    /// Minutes between the two creations (never negative)
    pub minutes: f64,
}

/// Kind-specific pattern payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern_kind", rename_all = "snake_case")]
pub enum PatternKind {
    /// Items with pairwise cosine similarity above the threshold
    SemanticCluster {
        /// Mean pairwise similarity of the members
        mean_similarity: f64,
    },

    /// Recurring kind-to-kind transition between adjacent items
    TemporalSequence {
        from: KnowledgeKind,
        to: KnowledgeKind,
        occurrences: Vec<TransitionOccurrence>,
    },

    /// Transition whose occurrences show growing importance
    LearningTransition {
        from: KnowledgeKind,
        to: KnowledgeKind,
        mean_importance_delta: f64,
        mean_time_delta_minutes: f64,
        occurrences: Vec<TransitionOccurrence>,
    },
}

impl PatternKind {
    /// Discriminant name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SemanticCluster { .. } => "semantic_cluster",
            Self::TemporalSequence { .. } => "temporal_sequence",
            Self::LearningTransition { .. } => "learning_transition",
        }
    }

    /// Key used for id derivation
    fn id_key(&self) -> String {
        match self {
            Self::SemanticCluster { .. } => self.name().to_string(),
            Self::TemporalSequence { from, to, .. } | Self::LearningTransition { from, to, .. } => {
                format!("{}:{}->{}", self.name(), from, to)
            }
        }
    }

    /// Recorded occurrences, empty for clusters
    pub fn occurrences(&self) -> &[TransitionOccurrence] {
        match self {
            Self::SemanticCluster { .. } => &[],
            Self::TemporalSequence { occurrences, .. }
            | Self::LearningTransition { occurrences, .. } => occurrences,
        }
    }

    /// Source kind of a transition
    pub fn source_kind(&self) -> Option<KnowledgeKind> {
        match self {
            Self::SemanticCluster { .. } => None,
            Self::TemporalSequence { from, .. } | Self::LearningTransition { from, .. } => {
                Some(*from)
            }
        }
    }

    /// Target kind of a transition
    pub fn target_kind(&self) -> Option<KnowledgeKind> {
        match self {
            Self::SemanticCluster { .. } => None,
            Self::TemporalSequence { to, .. } | Self::LearningTransition { to, .. } => Some(*to),
        }
    }
}

/// Discovered statistical regularity among knowledge items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Deterministic identifier
    pub id: PatternId,
    /// Kind and payload
    pub kind: PatternKind,
    /// Member item ids (clusters: join order; transitions: chronological)
    pub member_ids: Vec<ItemId>,
    /// Confidence in [0, 1], a function of support and corpus size
    pub confidence: f64,
    /// Learning efficiency, 0 for other kinds
    pub efficiency_score: f64,
    /// Number of corpus occurrences backing the pattern
    pub support_count: usize,
}

impl Pattern {
    /// Build a pattern, deriving its id from kind and members
    pub fn new(
        kind: PatternKind,
        member_ids: Vec<ItemId>,
        support_count: usize,
        confidence: f64,
        efficiency_score: f64,
    ) -> Self {
        let id = PatternId::derive(&kind.id_key(), &member_ids);
        Self {
            id,
            kind,
            member_ids,
            confidence,
            efficiency_score,
            support_count,
        }
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == item_id)
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.kind, PatternKind::SemanticCluster { .. })
    }
}

/// Cluster confidence: support over corpus size
pub fn cluster_confidence(support: usize, corpus_size: usize) -> f64 {
    if corpus_size == 0 {
        return 0.0;
    }
    (support as f64 / corpus_size as f64).clamp(0.0, 1.0)
}

/// Transition confidence: support over the number of adjacent pairs
pub fn transition_confidence(support: usize, corpus_size: usize) -> f64 {
    let pairs = corpus_size.saturating_sub(1).max(1);
    (support as f64 / pairs as f64).clamp(0.0, 1.0)
}

/// Per-kind pattern counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCounts {
    pub semantic_clusters: usize,
    pub temporal_sequences: usize,
    pub learning_transitions: usize,
}

impl PatternCounts {
    pub fn from_patterns(patterns: &[Pattern]) -> Self {
        let mut counts = Self::default();
        for pattern in patterns {
            match pattern.kind {
                PatternKind::SemanticCluster { .. } => counts.semantic_clusters += 1,
                PatternKind::TemporalSequence { .. } => counts.temporal_sequences += 1,
                PatternKind::LearningTransition { .. } => counts.learning_transitions += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.semantic_clusters + self.temporal_sequences + self.learning_transitions
    }
}

/// Immutable result of one discovery run, shared across sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSet {
    /// Monotonic run counter within one store
    pub generation: u64,
    /// When the run finished
    pub discovered_at: DateTime<Utc>,
    /// Corpus size the confidences were computed against
    pub corpus_size: usize,
    patterns: Vec<Pattern>,
    #[serde(skip)]
    by_item: HashMap<ItemId, Vec<usize>>,
}

impl PatternSet {
    pub fn new(generation: u64, corpus_size: usize, patterns: Vec<Pattern>) -> Self {
        let mut set = Self {
            generation,
            discovered_at: Utc::now(),
            corpus_size,
            patterns,
            by_item: HashMap::new(),
        };
        set.reindex();
        set
    }

    /// Set with no patterns, served before the first run
    pub fn empty() -> Self {
        Self::new(0, 0, Vec::new())
    }

    /// Rebuild the member index (after deserialization)
    pub(crate) fn reindex(&mut self) {
        self.by_item.clear();
        for (idx, pattern) in self.patterns.iter().enumerate() {
            for member in &pattern.member_ids {
                let slots = self.by_item.entry(member.clone()).or_default();
                if slots.last() != Some(&idx) {
                    slots.push(idx);
                }
            }
        }
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Patterns that list an item as a member
    pub fn patterns_for<'a>(&'a self, item_id: &str) -> impl Iterator<Item = &'a Pattern> + 'a {
        self.by_item
            .get(item_id)
            .into_iter()
            .flatten()
            .filter_map(move |idx| self.patterns.get(*idx))
    }

    pub fn counts(&self) -> PatternCounts {
        PatternCounts::from_patterns(&self.patterns)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<ItemId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pattern_id_is_deterministic() {
        let a = Pattern::new(
            PatternKind::SemanticCluster { mean_similarity: 0.9 },
            ids(&["a", "b", "c"]),
            3,
            0.6,
            0.0,
        );
        let b = Pattern::new(
            PatternKind::SemanticCluster { mean_similarity: 0.9 },
            ids(&["a", "b", "c"]),
            3,
            0.6,
            0.0,
        );
        let c = Pattern::new(
            PatternKind::SemanticCluster { mean_similarity: 0.9 },
            ids(&["a", "b", "d"]),
            3,
            0.6,
            0.0,
        );
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_transition_ids_depend_on_kinds() {
        let seq = |from, to| {
            Pattern::new(
                PatternKind::TemporalSequence {
                    from,
                    to,
                    occurrences: vec![],
                },
                ids(&["a", "b"]),
                2,
                0.5,
                0.0,
            )
        };
        assert_ne!(
            seq(KnowledgeKind::Factual, KnowledgeKind::Procedural).id,
            seq(KnowledgeKind::Procedural, KnowledgeKind::Factual).id
        );
    }

    #[test]
    fn test_confidence_functions() {
        assert!((cluster_confidence(3, 5) - 0.6).abs() < 1e-12);
        assert_eq!(cluster_confidence(3, 0), 0.0);
        assert!((transition_confidence(2, 5) - 0.5).abs() < 1e-12);
        assert_eq!(transition_confidence(1, 1), 1.0);
        assert_eq!(transition_confidence(9, 3), 1.0);
    }

    #[test]
    fn test_pattern_set_member_index() {
        let set = PatternSet::new(
            1,
            5,
            vec![
                Pattern::new(
                    PatternKind::SemanticCluster { mean_similarity: 0.9 },
                    ids(&["a", "b", "c"]),
                    3,
                    0.6,
                    0.0,
                ),
                Pattern::new(
                    PatternKind::TemporalSequence {
                        from: KnowledgeKind::Factual,
                        to: KnowledgeKind::Procedural,
                        occurrences: vec![],
                    },
                    ids(&["c", "d"]),
                    2,
                    0.5,
                    0.0,
                ),
            ],
        );

        assert_eq!(set.patterns_for("c").count(), 2);
        assert_eq!(set.patterns_for("a").count(), 1);
        assert_eq!(set.patterns_for("zzz").count(), 0);
        assert_eq!(set.counts().total(), 2);
    }

    #[test]
    fn test_pattern_kind_serializes_tagged() {
        let kind = PatternKind::SemanticCluster { mean_similarity: 0.85 };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["pattern_kind"], "semantic_cluster");
    }

    #[test]
    fn test_reindex_after_deserialize() {
        let set = PatternSet::new(
            4,
            3,
            vec![Pattern::new(
                PatternKind::SemanticCluster { mean_similarity: 0.9 },
                ids(&["x", "y", "z"]),
                3,
                1.0,
                0.0,
            )],
        );
        let json = serde_json::to_string(&set).unwrap();
        let mut restored: PatternSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.patterns_for("x").count(), 0);
        restored.reindex();
        assert_eq!(restored.patterns_for("x").count(), 1);
        assert_eq!(restored.generation, 4);
    }
}
