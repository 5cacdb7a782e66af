//! Per-session working state
//!
//! Components:
//! - Context: one cache, history and redirection log per session
//! - Manager: registry of live sessions
//! - Assembly: token-bounded text context from cached items
//! - Ledger: usage increments still owed to the repository

pub mod assembly;
pub mod ledger;
pub mod context;
pub mod manager;

pub use assembly::{AssembledContext, ContextAssembler, ContextConfig, ContextFormat};
pub use context::{SessionContext, SessionSummary};
pub use ledger::UsageLedger;
pub use manager::SessionManager;
