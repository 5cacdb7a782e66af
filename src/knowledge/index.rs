//! Corpus index: item lookup plus precomputed keyword sets

use std::collections::{HashMap, HashSet};

use crate::knowledge::types::{ItemId, KnowledgeItem, KnowledgeKind};
use crate::prediction::keywords::extract_keywords;

/// Indexed knowledge item
#[derive(Debug, Clone)]
pub struct IndexedItem {
    pub item: KnowledgeItem,
    pub keywords: HashSet<String>,
}

/// Read-only view over a corpus snapshot, built once per prediction cycle
#[derive(Debug, Clone, Default)]
pub struct CorpusIndex {
    entries: HashMap<ItemId, IndexedItem>,
    /// Item ids in ascending order for deterministic iteration
    order: Vec<ItemId>,
}

impl CorpusIndex {
    /// Index a corpus snapshot. Later duplicates of an id replace earlier ones.
    pub fn from_items(items: impl IntoIterator<Item = KnowledgeItem>) -> Self {
        let mut entries = HashMap::new();
        for item in items {
            let keywords = extract_keywords(&item.searchable_text());
            entries.insert(item.id.clone(), IndexedItem { item, keywords });
        }

        let mut order: Vec<ItemId> = entries.keys().cloned().collect();
        order.sort();

        Self { entries, order }
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeItem> {
        self.entries.get(id).map(|e| &e.item)
    }

    pub fn keywords(&self, id: &str) -> Option<&HashSet<String>> {
        self.entries.get(id).map(|e| &e.keywords)
    }

    pub fn kind_of(&self, id: &str) -> Option<KnowledgeKind> {
        self.entries.get(id).map(|e| e.item.kind)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Iterate in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &IndexedItem> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_precomputes_keywords() {
        let index = CorpusIndex::from_items(vec![KnowledgeItem::new(
            "a",
            KnowledgeKind::Procedural,
            "Rebuild cargo cache",
            "Delete target directory then rebuild",
        )]);

        let keywords = index.keywords("a").unwrap();
        assert!(keywords.contains("cargo"));
        assert!(keywords.contains("rebuild"));
        assert!(keywords.contains("directory"));
        assert_eq!(index.kind_of("a"), Some(KnowledgeKind::Procedural));
    }

    #[test]
    fn test_iteration_is_sorted() {
        let index = CorpusIndex::from_items(vec![
            KnowledgeItem::new("c", KnowledgeKind::Factual, "t", "c"),
            KnowledgeItem::new("a", KnowledgeKind::Factual, "t", "c"),
            KnowledgeItem::new("b", KnowledgeKind::Factual, "t", "c"),
        ]);
        let ids: Vec<&str> = index.iter().map(|e| e.item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(index.len(), 3);
    }
}
