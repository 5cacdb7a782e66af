//! Error types for the pattern-aware cache engine
//!
//! One taxonomy for every component: validation of inputs, unknown items,
//! unreachable stores, budget misconfiguration and lifecycle misuse.

use thiserror::Error;

/// Main error type for the cache engine
#[derive(Error, Debug)]
pub enum CacheError {
    /// Malformed input: embedding dimensionality, thresholds, negative budgets
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown item id
    #[error("Knowledge item not found: {id}")]
    NotFound { id: String },

    /// Repository unreachable or timed out (recoverable)
    #[error("Knowledge store unavailable: {0}")]
    TransientStore(String),

    /// A single item costs more than the whole budget
    #[error("Item {id} needs {required} tokens but the budget is {budget} tokens")]
    BudgetExceeded {
        id: String,
        required: usize,
        budget: usize,
    },

    /// Unknown or already closed session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Cache lifecycle errors
    #[error("Invalid cache transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Deadline or cancellation hit before commit
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Cache engine error: {0}")]
    Generic(String),
}

impl CacheError {
    /// Errors that should degrade to serving from the existing cache
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::TransientStore(_) | CacheError::Cancelled(_))
    }

    /// Shorthand for a not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        CacheError::NotFound { id: id.into() }
    }
}

/// Result type alias for cache engine operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Convert anyhow errors raised at the config/persistence edges
impl From<anyhow::Error> for CacheError {
    fn from(err: anyhow::Error) -> Self {
        CacheError::Generic(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exceeded_display() {
        let err = CacheError::BudgetExceeded {
            id: "item-7".to_string(),
            required: 120,
            budget: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("item-7"));
        assert!(msg.contains("120"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CacheError::TransientStore("down".to_string()).is_transient());
        assert!(CacheError::Cancelled("deadline".to_string()).is_transient());
        assert!(!CacheError::not_found("x").is_transient());
        assert!(!CacheError::Validation("bad".to_string()).is_transient());
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: CacheError = anyhow::anyhow!("root cause")
            .context("Failed to read config file")
            .into();
        let msg = err.to_string();
        assert!(msg.contains("Failed to read config file"));
        assert!(msg.contains("root cause"));
    }
}
