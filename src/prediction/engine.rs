//! Prediction engine: ranks candidate items for a context
//!
//! # Scoring
//!
//! ```text
//! confidence = w_l * lexical + w_p * pattern_boost + w_i * importance / 100
//! ```
//!
//! clamped to [0, 1], with default weights 0.5 / 0.3 / 0.2.
//!
//! - lexical: Jaccard overlap of the context's keywords and the item's
//! - pattern_boost: best boost over the patterns the item belongs to
//!   - cluster: confidence x fraction of the other members already in history
//!   - transition: full confidence when an occurrence `a -> item` has `a` in
//!     history, half when only an item of the source kind is in history

use std::collections::HashSet;

use crate::errors::Result;
use crate::knowledge::index::CorpusIndex;
use crate::knowledge::types::{ItemId, KnowledgeItem, KnowledgeKind};
use crate::patterns::types::{Pattern, PatternId, PatternKind, PatternSet};
use crate::prediction::keywords::{extract_keywords, jaccard};
use crate::prediction::types::{PredictionOptions, Recommendation};

/// Best pattern boost for one candidate
#[derive(Debug, Clone, PartialEq)]
struct Boost {
    value: f64,
    pattern_id: PatternId,
    reason: String,
}

/// Session history resolved against the corpus
struct History {
    ids: HashSet<ItemId>,
    kinds: HashSet<KnowledgeKind>,
}

impl History {
    fn resolve(session_history: &[ItemId], index: &CorpusIndex) -> Self {
        let ids: HashSet<ItemId> = session_history.iter().cloned().collect();
        let kinds = session_history.iter().filter_map(|id| index.kind_of(id)).collect();
        Self { ids, kinds }
    }
}

/// Boost contributed by one pattern, if any
fn pattern_boost(pattern: &Pattern, candidate: &KnowledgeItem, history: &History) -> Option<Boost> {
    match &pattern.kind {
        PatternKind::SemanticCluster { .. } => {
            let others: Vec<&ItemId> = pattern.member_ids.iter().filter(|m| **m != candidate.id).collect();
            if others.is_empty() {
                return None;
            }
            let seen = others.iter().filter(|m| history.ids.contains(**m)).count();
            if seen == 0 {
                return None;
            }
            Some(Boost {
                value: pattern.confidence * seen as f64 / others.len() as f64,
                pattern_id: pattern.id,
                reason: format!("{}/{} cluster members already used", seen, others.len()),
            })
        }
        PatternKind::TemporalSequence { from, to, occurrences }
        | PatternKind::LearningTransition { from, to, occurrences, .. } => {
            let arrivals: Vec<&ItemId> = occurrences
                .iter()
                .filter(|o| o.to_id == candidate.id)
                .map(|o| &o.from_id)
                .collect();
            if arrivals.is_empty() {
                return None;
            }
            if arrivals.iter().any(|from_id| history.ids.contains(*from_id)) {
                Some(Boost {
                    value: pattern.confidence,
                    pattern_id: pattern.id,
                    reason: format!("usually follows a {} item already used ({} -> {})", from, from, to),
                })
            } else if history.kinds.contains(from) {
                Some(Boost {
                    value: pattern.confidence / 2.0,
                    pattern_id: pattern.id,
                    reason: format!("{} items tend to follow {} items", to, from),
                })
            } else {
                None
            }
        }
    }
}

/// Highest boost; the first maximizing pattern wins ties
fn best_boost<'a>(
    patterns: impl Iterator<Item = &'a Pattern>,
    candidate: &KnowledgeItem,
    history: &History,
) -> Option<Boost> {
    let mut best: Option<Boost> = None;
    for pattern in patterns {
        if let Some(boost) = pattern_boost(pattern, candidate, history) {
            match &best {
                Some(current) if current.value >= boost.value => {}
                _ => best = Some(boost),
            }
        }
    }
    best
}

/// Shared scoring loop
fn rank<'a, F, I>(
    context_text: &str,
    session_history: &[ItemId],
    index: &'a CorpusIndex,
    options: &PredictionOptions,
    patterns_for: F,
) -> Result<Vec<Recommendation>>
where
    F: Fn(&str) -> I,
    I: Iterator<Item = &'a Pattern>,
{
    options.validate()?;

    let context_keywords = extract_keywords(context_text);
    let history = History::resolve(session_history, index);
    let weights = options.weights;

    let mut scored: Vec<(Recommendation, &KnowledgeItem)> = Vec::new();
    for entry in index.iter() {
        let item = &entry.item;
        let lexical = jaccard(&context_keywords, &entry.keywords);
        let boost = best_boost(patterns_for(&item.id), item, &history);
        let boost_value = boost.as_ref().map(|b| b.value).unwrap_or(0.0);

        let confidence = (weights.lexical * lexical
            + weights.pattern * boost_value
            + weights.importance * item.normalized_importance())
        .clamp(0.0, 1.0);

        if confidence < options.confidence_threshold {
            continue;
        }

        let mut rationale = format!("keyword overlap {:.2}", lexical);
        if let Some(boost) = &boost {
            rationale.push_str("; ");
            rationale.push_str(&boost.reason);
        }
        rationale.push_str(&format!("; importance {}", item.importance));

        scored.push((
            Recommendation {
                item_id: item.id.clone(),
                confidence,
                rationale,
                matched_pattern_id: boost.map(|b| b.pattern_id),
            },
            item,
        ));
    }

    scored.sort_by(|(ra, a), (rb, b)| {
        rb.confidence
            .partial_cmp(&ra.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.importance.cmp(&a.importance))
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(options.max_results);

    tracing::debug!(
        candidates = index.len(),
        returned = scored.len(),
        "prediction ranked"
    );

    Ok(scored.into_iter().map(|(rec, _)| rec).collect())
}

/// Rank items for a context against a plain pattern list
///
/// Returns an empty list when nothing clears the threshold; errors only on
/// malformed options.
pub fn predict(
    context_text: &str,
    session_history: &[ItemId],
    patterns: &[Pattern],
    index: &CorpusIndex,
    options: &PredictionOptions,
) -> Result<Vec<Recommendation>> {
    rank(context_text, session_history, index, options, |id| {
        let id = id.to_string();
        patterns.iter().filter(move |p| p.contains(&id))
    })
}

/// Prediction engine bound to a set of options
#[derive(Debug, Clone, Default)]
pub struct PredictionEngine {
    options: PredictionOptions,
}

impl PredictionEngine {
    /// Create an engine with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with validated options
    pub fn with_options(options: PredictionOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PredictionOptions {
        &self.options
    }

    /// Rank items using a shared pattern snapshot
    pub fn predict(
        &self,
        context_text: &str,
        session_history: &[ItemId],
        patterns: &PatternSet,
        index: &CorpusIndex,
    ) -> Result<Vec<Recommendation>> {
        rank(context_text, session_history, index, &self.options, |id| {
            patterns.patterns_for(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CacheError;
    use crate::patterns::types::{cluster_confidence, TransitionOccurrence};
    use chrono::{Duration, TimeZone, Utc};

    fn item(id: &str, kind: KnowledgeKind, title: &str, content: &str, importance: u8) -> KnowledgeItem {
        KnowledgeItem::new(id, kind, title, content).with_importance(importance)
    }

    fn corpus() -> CorpusIndex {
        CorpusIndex::from_items(vec![
            item("borrow", KnowledgeKind::Procedural, "Borrow checker errors", "Fix lifetime errors in borrow checker", 60),
            item("cargo", KnowledgeKind::Factual, "Cargo workspace layout", "Workspace members share a lock file", 40),
            item("tokio", KnowledgeKind::Experiential, "Tokio runtime panics", "Nested runtime panics when blocking", 80),
            item("misc", KnowledgeKind::Contextual, "Unrelated note", "Coffee machine location", 10),
        ])
    }

    fn cluster(members: &[&str]) -> Pattern {
        Pattern::new(
            PatternKind::SemanticCluster { mean_similarity: 0.9 },
            members.iter().map(|m| m.to_string()).collect(),
            members.len(),
            cluster_confidence(members.len(), 4),
            0.0,
        )
    }

    #[test]
    fn test_lexical_match_ranks_first() {
        let recs = predict(
            "borrow checker lifetime errors",
            &[],
            &[],
            &corpus(),
            &PredictionOptions::default(),
        )
        .unwrap();

        assert!(!recs.is_empty());
        assert_eq!(recs[0].item_id, "borrow");
        assert!(recs[0].matched_pattern_id.is_none());
        assert!(recs[0].rationale.contains("keyword overlap"));
    }

    #[test]
    fn test_nothing_above_threshold_is_empty_not_error() {
        let recs = predict(
            "quantum chromodynamics",
            &[],
            &[],
            &corpus(),
            &PredictionOptions::default().with_threshold(0.9),
        )
        .unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn test_malformed_options_error() {
        let err = predict("x", &[], &[], &corpus(), &PredictionOptions::default().with_max_results(0))
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
    }

    #[test]
    fn test_cluster_boost_uses_history() {
        let patterns = vec![cluster(&["borrow", "cargo", "tokio"])];
        let history = vec!["borrow".to_string(), "cargo".to_string()];
        let opts = PredictionOptions::default().with_threshold(0.0);

        let without = predict("runtime", &[], &patterns, &corpus(), &opts).unwrap();
        let with = predict("runtime", &history, &patterns, &corpus(), &opts).unwrap();

        let conf = |recs: &[Recommendation], id: &str| {
            recs.iter().find(|r| r.item_id == id).map(|r| r.confidence).unwrap()
        };
        let boosted = with.iter().find(|r| r.item_id == "tokio").unwrap();
        assert_eq!(boosted.matched_pattern_id, Some(patterns[0].id));
        // 0.3 * (3/4 confidence) * (2/2 members seen)
        assert!((conf(&with, "tokio") - conf(&without, "tokio") - 0.3 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_transition_boost_full_and_half() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let index = CorpusIndex::from_items(vec![
            item("f1", KnowledgeKind::Factual, "a", "a", 0).with_created_at(base),
            item("p1", KnowledgeKind::Procedural, "b", "b", 0).with_created_at(base + Duration::minutes(1)),
            item("f2", KnowledgeKind::Factual, "c", "c", 0).with_created_at(base + Duration::minutes(2)),
        ]);
        let sequence = Pattern::new(
            PatternKind::TemporalSequence {
                from: KnowledgeKind::Factual,
                to: KnowledgeKind::Procedural,
                occurrences: vec![TransitionOccurrence {
                    from_id: "f1".to_string(),
                    to_id: "p1".to_string(),
                    importance_delta: 0,
                    minutes: 1.0,
                }],
            },
            vec!["f1".to_string(), "p1".to_string()],
            1,
            0.5,
            0.0,
        );
        let opts = PredictionOptions::default().with_threshold(0.0);

        let full = predict("", &["f1".to_string()], &[sequence.clone()], &index, &opts).unwrap();
        let half = predict("", &["f2".to_string()], &[sequence.clone()], &index, &opts).unwrap();
        let none = predict("", &[], &[sequence], &index, &opts).unwrap();

        let conf = |recs: &[Recommendation]| recs.iter().find(|r| r.item_id == "p1").unwrap().confidence;
        assert!((conf(&full) - 0.15).abs() < 1e-9);
        assert!((conf(&half) - 0.075).abs() < 1e-9);
        assert_eq!(conf(&none), 0.0);
    }

    #[test]
    fn test_ordering_ties_break_on_importance_then_recency_then_id() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let index = CorpusIndex::from_items(vec![
            item("b", KnowledgeKind::Factual, "x", "x", 50).with_created_at(base),
            item("a", KnowledgeKind::Factual, "x", "x", 50).with_created_at(base),
            item("newer", KnowledgeKind::Factual, "x", "x", 50).with_created_at(base + Duration::days(1)),
        ]);
        let mut opts = PredictionOptions::default().with_threshold(0.0);
        opts.weights.importance = 0.0;

        let recs = predict("", &[], &[], &index, &opts).unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "a", "b"]);
    }

    #[test]
    fn test_max_results_truncates() {
        let recs = predict(
            "",
            &[],
            &[],
            &corpus(),
            &PredictionOptions::default().with_threshold(0.0).with_max_results(2),
        )
        .unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].item_id, "tokio");
        assert_eq!(recs[1].item_id, "borrow");
    }

    #[test]
    fn test_engine_matches_free_function() {
        let patterns = vec![cluster(&["borrow", "cargo", "tokio"])];
        let set = PatternSet::new(1, 4, patterns.clone());
        let history = vec!["cargo".to_string()];
        let opts = PredictionOptions::default().with_threshold(0.1);

        let engine = PredictionEngine::with_options(opts.clone()).unwrap();
        let via_engine = engine.predict("lifetime errors", &history, &set, &corpus()).unwrap();
        let via_fn = predict("lifetime errors", &history, &patterns, &corpus(), &opts).unwrap();
        assert_eq!(via_engine, via_fn);
    }
}
