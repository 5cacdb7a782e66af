//! Service facade
//!
//! Wires repository, pattern store, prediction, sessions and telemetry into
//! one entry point for embedding applications.

pub mod service;

pub use service::{PatternCacheService, PrefetchOutcome, ShutdownSummary};
