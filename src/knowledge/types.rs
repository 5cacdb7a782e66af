//! Core data types for stored knowledge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for knowledge items
pub type ItemId = String;

/// Upper bound of the importance scale
pub const MAX_IMPORTANCE: u8 = 100;

/// Knowledge item classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    Factual,
    Procedural,
    Contextual,
    Relational,
    Experiential,
    TechnicalDiscovery,
}

impl KnowledgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Procedural => "procedural",
            Self::Contextual => "contextual",
            Self::Relational => "relational",
            Self::Experiential => "experiential",
            Self::TechnicalDiscovery => "technical_discovery",
        }
    }

    /// All kinds in declaration order
    pub fn all() -> [KnowledgeKind; 6] {
        [
            Self::Factual,
            Self::Procedural,
            Self::Contextual,
            Self::Relational,
            Self::Experiential,
            Self::TechnicalDiscovery,
        ]
    }
}

impl std::fmt::Display for KnowledgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knowledge item: one stored unit of text, metadata and embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique item identifier
    pub id: ItemId,
    /// Item classification
    pub kind: KnowledgeKind,
    /// Free-text category label
    pub category: String,
    /// Short title
    pub title: String,
    /// Body text
    pub content: String,
    /// Semantic embedding (fixed length per corpus)
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Importance on a 0-100 scale
    pub importance: u8,
    /// Number of recorded uses
    #[serde(default)]
    pub usage_count: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Owning project reference
    #[serde(default)]
    pub project_id: String,
}

impl KnowledgeItem {
    /// Create a new item with neutral importance and no embedding
    pub fn new(
        id: impl Into<ItemId>,
        kind: KnowledgeKind,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            category: String::new(),
            title: title.into(),
            content: content.into(),
            embedding: Vec::new(),
            importance: 50,
            usage_count: 0,
            created_at: Utc::now(),
            project_id: String::new(),
        }
    }

    /// Attach an embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set importance, saturating at the top of the scale
    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance.min(MAX_IMPORTANCE);
        self
    }

    /// Set the creation timestamp
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set the category label
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the owning project
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Importance scaled to 0.0-1.0
    pub fn normalized_importance(&self) -> f64 {
        f64::from(self.importance.min(MAX_IMPORTANCE)) / f64::from(MAX_IMPORTANCE)
    }

    /// Text used for keyword matching and token costing
    pub fn searchable_text(&self) -> String {
        format!("{}\n{}", self.title, self.content)
    }
}

/// Filter for repository scans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemFilter {
    /// Restrict to one kind
    pub kind: Option<KnowledgeKind>,
    /// Restrict to one category
    pub category: Option<String>,
    /// Minimum importance (inclusive)
    pub min_importance: u8,
}

impl ItemFilter {
    /// Filter matching every item
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_kind(mut self, kind: KnowledgeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_min_importance(mut self, min_importance: u8) -> Self {
        self.min_importance = min_importance;
        self
    }

    /// Check whether an item passes the filter
    pub fn matches(&self, item: &KnowledgeItem) -> bool {
        if let Some(kind) = self.kind {
            if item.kind != kind {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &item.category != category {
                return false;
            }
        }
        item.importance >= self.min_importance
    }
}
