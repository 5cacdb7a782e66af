//! Temporal sequence mining and learning-efficiency scoring
//!
//! Items are walked in creation order. Each adjacent pair created within the
//! window records a `kind(a) -> kind(b)` transition; transitions with enough
//! support become sequence patterns. The subset of occurrences with a
//! positive importance delta is scored for learning efficiency.

use chrono::Duration;
use std::collections::BTreeMap;

use crate::knowledge::types::{ItemId, KnowledgeItem, KnowledgeKind};
use crate::patterns::types::{transition_confidence, Pattern, PatternKind, TransitionOccurrence};

/// Occurrences grouped by transition, in kind order
pub type TransitionTable = BTreeMap<(KnowledgeKind, KnowledgeKind), Vec<TransitionOccurrence>>;

/// Collect adjacent-pair transitions from items in canonical order
pub fn mine_transitions(ordered: &[&KnowledgeItem], window: Duration) -> TransitionTable {
    let mut table = TransitionTable::new();

    for pair in ordered.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let gap = b.created_at - a.created_at;
        if gap > window {
            continue;
        }

        let minutes = (gap.num_milliseconds() as f64 / 60_000.0).max(0.0);
        table.entry((a.kind, b.kind)).or_default().push(TransitionOccurrence {
            from_id: a.id.clone(),
            to_id: b.id.clone(),
            importance_delta: i32::from(b.importance) - i32::from(a.importance),
            minutes,
        });
    }

    table
}

/// Members of a transition pattern: every item involved, first appearance first
fn occurrence_members(occurrences: &[TransitionOccurrence]) -> Vec<ItemId> {
    let mut members: Vec<ItemId> = Vec::new();
    for occurrence in occurrences {
        for id in [&occurrence.from_id, &occurrence.to_id] {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }
    }
    members
}

/// Sequence patterns for transitions with `support >= min_support`
pub fn sequence_patterns(table: &TransitionTable, min_support: usize, corpus_size: usize) -> Vec<Pattern> {
    table
        .iter()
        .filter(|(_, occurrences)| occurrences.len() >= min_support)
        .map(|((from, to), occurrences)| {
            let support = occurrences.len();
            Pattern::new(
                PatternKind::TemporalSequence {
                    from: *from,
                    to: *to,
                    occurrences: occurrences.clone(),
                },
                occurrence_members(occurrences),
                support,
                transition_confidence(support, corpus_size),
                0.0,
            )
        })
        .collect()
}

/// Learning efficiency from the mean deltas
///
/// Simultaneous creation (mean minutes <= 0) yields the mean importance
/// delta itself rather than a division by zero.
pub fn efficiency(mean_importance_delta: f64, mean_minutes: f64) -> f64 {
    if mean_minutes > 0.0 {
        mean_importance_delta / mean_minutes
    } else {
        mean_importance_delta
    }
}

/// Learning-transition patterns, highest efficiency first
pub fn learning_patterns(table: &TransitionTable, min_support: usize, corpus_size: usize) -> Vec<Pattern> {
    let mut patterns: Vec<Pattern> = table
        .iter()
        .filter_map(|((from, to), occurrences)| {
            let improving: Vec<TransitionOccurrence> = occurrences
                .iter()
                .filter(|o| o.importance_delta > 0)
                .cloned()
                .collect();
            if improving.is_empty() || improving.len() < min_support {
                return None;
            }

            let support = improving.len();
            let mean_delta =
                improving.iter().map(|o| f64::from(o.importance_delta)).sum::<f64>() / support as f64;
            let mean_minutes = improving.iter().map(|o| o.minutes).sum::<f64>() / support as f64;
            let score = efficiency(mean_delta, mean_minutes);

            Some(Pattern::new(
                PatternKind::LearningTransition {
                    from: *from,
                    to: *to,
                    mean_importance_delta: mean_delta,
                    mean_time_delta_minutes: mean_minutes,
                    occurrences: improving.clone(),
                },
                occurrence_members(&improving),
                support,
                transition_confidence(support, corpus_size),
                score,
            ))
        })
        .collect();

    // Stable: equal scores keep kind order
    patterns.sort_by(|a, b| {
        b.efficiency_score
            .partial_cmp(&a.efficiency_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    patterns
}
