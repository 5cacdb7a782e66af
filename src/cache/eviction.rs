//! Eviction order
//!
//! A max-heap whose top is the most evictable entry:
//! lowest priority first, then oldest `last_accessed`, then smallest id.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::cache::types::CacheEntry;
use crate::knowledge::types::ItemId;

/// Heap entry for eviction
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub id: ItemId,
    pub priority: f64,
    pub last_accessed: DateTime<Utc>,
    pub token_cost: usize,
}

impl EvictionCandidate {
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            id: entry.item.id.clone(),
            priority: entry.priority,
            last_accessed: entry.last_accessed,
            token_cost: entry.token_cost,
        }
    }
}

impl PartialEq for EvictionCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EvictionCandidate {}

impl PartialOrd for EvictionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvictionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed on every key: the "smallest" entry sits on top of the heap
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.last_accessed.cmp(&self.last_accessed))
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Build the eviction queue for a set of entries
pub fn eviction_queue<'a>(entries: impl IntoIterator<Item = &'a CacheEntry>) -> BinaryHeap<EvictionCandidate> {
    entries.into_iter().map(EvictionCandidate::from_entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candidate(id: &str, priority: f64, minute: i64) -> EvictionCandidate {
        EvictionCandidate {
            id: id.to_string(),
            priority,
            last_accessed: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            token_cost: 10,
        }
    }

    fn drain(heap: BinaryHeap<EvictionCandidate>) -> Vec<String> {
        let mut heap = heap;
        let mut order = Vec::new();
        while let Some(c) = heap.pop() {
            order.push(c.id);
        }
        order
    }

    #[test]
    fn test_lowest_priority_pops_first() {
        let heap: BinaryHeap<_> = vec![
            candidate("high", 0.9, 0),
            candidate("low", 0.1, 5),
            candidate("mid", 0.5, 0),
        ]
        .into_iter()
        .collect();
        assert_eq!(drain(heap), vec!["low", "mid", "high"]);
    }

    #[test]
    fn test_ties_break_on_age_then_id() {
        let heap: BinaryHeap<_> = vec![
            candidate("newer", 0.5, 10),
            candidate("b_old", 0.5, 0),
            candidate("a_old", 0.5, 0),
        ]
        .into_iter()
        .collect();
        assert_eq!(drain(heap), vec!["a_old", "b_old", "newer"]);
    }
}
