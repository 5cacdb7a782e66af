//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::errors::{CacheError, Result};

/// Environment variable overriding the configured filter
pub const LOG_ENV: &str = "PATTERN_CACHE_LOG";

/// Build the filter: `PATTERN_CACHE_LOG` when set, else `level`
pub fn filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CacheError::Config(format!("invalid log filter {:?}: {}", level, e)))
}

/// Install a fmt subscriber for the process
///
/// Fails if the filter is malformed or a global subscriber is already set.
pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_target(true)
        .try_init()
        .map_err(|e| CacheError::Config(format!("failed to install tracing subscriber: {}", e)))
}
