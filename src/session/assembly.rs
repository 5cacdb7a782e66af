//! Context assembly from cached items
//!
//! Turns a session's working set into the text handed to the consuming
//! caller, highest priority first, within a token limit.

use serde::{Deserialize, Serialize};

use crate::cache::counter::TokenCounter;
use crate::cache::types::CacheEntry;
use crate::knowledge::types::ItemId;

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum tokens for assembled context
    pub max_context_tokens: usize,
    /// Include item metadata in context
    pub include_metadata: bool,
    /// Format for context presentation
    pub format: ContextFormat,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 2000,
            include_metadata: true,
            format: ContextFormat::Structured,
        }
    }
}

/// Format for presenting context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    /// Structured with clear item boundaries
    Structured,
    /// Compact inline format
    Inline,
    /// Numbered list format
    Numbered,
}

/// Assembled context for the consuming caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// The formatted context text
    pub text: String,
    /// Estimated token count of the included items
    pub estimated_tokens: usize,
    /// Item ids included, in order
    pub item_ids: Vec<ItemId>,
}

impl AssembledContext {
    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }
}

/// Assembles text context from cache entries
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextConfig,
    counter: TokenCounter,
}

impl ContextAssembler {
    /// Create new assembler with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: ContextConfig) -> Self {
        Self {
            config,
            counter: TokenCounter::new(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Build context from entries already in priority order
    ///
    /// Entries that do not fit the remaining allowance are skipped; smaller
    /// ones further down may still fit.
    pub fn build(&self, entries: &[&CacheEntry], max_tokens: Option<usize>) -> AssembledContext {
        let limit = max_tokens.unwrap_or(self.config.max_context_tokens);
        let mut parts = Vec::new();
        let mut total_tokens = 0;
        let mut item_ids = Vec::new();

        for entry in entries {
            let formatted = self.format_entry(parts.len() + 1, entry);
            let tokens = self.counter.estimate(&formatted);
            if total_tokens + tokens > limit {
                continue;
            }

            parts.push(formatted);
            total_tokens += tokens;
            item_ids.push(entry.item.id.clone());
        }

        let text = if parts.is_empty() {
            String::new()
        } else {
            match self.config.format {
                ContextFormat::Structured => {
                    format!("Cached Knowledge ({} items):\n\n{}\n", parts.len(), parts.join("\n\n"))
                }
                ContextFormat::Inline => format!("Context: {}", parts.join(" | ")),
                ContextFormat::Numbered => format!("Context:\n{}\n", parts.join("\n")),
            }
        };

        AssembledContext {
            text,
            estimated_tokens: total_tokens,
            item_ids,
        }
    }

    fn format_entry(&self, index: usize, entry: &CacheEntry) -> String {
        let item = &entry.item;
        match self.config.format {
            ContextFormat::Structured => {
                if self.config.include_metadata {
                    format!(
                        "[Item {}] {} ({}, importance {}, priority {:.2})\n{}",
                        index, item.title, item.kind, item.importance, entry.priority, item.content
                    )
                } else {
                    format!("[Item {}] {}\n{}", index, item.title, item.content)
                }
            }
            ContextFormat::Inline => {
                if self.config.include_metadata {
                    format!("[{}|{}] {}: {}", item.kind, item.importance, item.title, item.content)
                } else {
                    format!("{}: {}", item.title, item.content)
                }
            }
            ContextFormat::Numbered => {
                if self.config.include_metadata {
                    format!("{}. ({}) {}: {}", index, item.kind, item.title, item.content)
                } else {
                    format!("{}. {}: {}", index, item.title, item.content)
                }
            }
        }
    }
}
