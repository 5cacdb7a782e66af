use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::engine::CacheConfig;
use crate::errors::{CacheError, Result};
use crate::patterns::discovery::DiscoveryConfig;
use crate::prediction::types::PredictionOptions;
use crate::session::assembly::ContextConfig;
use crate::telemetry::DEFAULT_EVENT_CAPACITY;

/// Engine configuration, one section per component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub prediction: PredictionOptions,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Retained telemetry events
    pub event_capacity: usize,
    /// Seconds between background discovery runs
    pub refresh_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            refresh_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when PATTERN_CACHE_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let config = EngineConfig::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| CacheError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CacheError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CacheError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".pattern-cache").join("config.toml"))
    }

    /// Reject out-of-range values in every section
    pub fn validate(&self) -> Result<()> {
        self.discovery.validate().map_err(as_config_error)?;
        self.prediction.validate().map_err(as_config_error)?;
        self.cache.validate().map_err(as_config_error)?;
        if self.context.max_context_tokens == 0 {
            return Err(CacheError::Config("context.max_context_tokens must be positive".to_string()));
        }
        if self.telemetry.event_capacity == 0 {
            return Err(CacheError::Config("telemetry.event_capacity must be positive".to_string()));
        }
        if self.telemetry.refresh_interval_secs == 0 {
            return Err(CacheError::Config(
                "telemetry.refresh_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn as_config_error(err: CacheError) -> CacheError {
    match err {
        CacheError::Validation(msg) => CacheError::Config(msg),
        other => other,
    }
}
