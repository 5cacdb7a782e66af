//! Registry of live sessions
//!
//! Sessions are fully isolated; the registry only hands out shared handles
//! and removes them at close.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::{CacheError, Result};
use crate::session::context::{SessionContext, SessionSummary};

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its own id
    pub async fn register(&self, session: SessionContext) -> Result<Arc<SessionContext>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.id()) {
            return Err(CacheError::Validation(format!(
                "session {} is already open",
                session.id()
            )));
        }
        let session = Arc::new(session);
        sessions.insert(session.id().to_string(), Arc::clone(&session));
        tracing::debug!(session = %session.id(), open = sessions.len(), "session registered");
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Result<Arc<SessionContext>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CacheError::SessionNotFound(id.to_string()))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Unregister and close a session
    pub async fn close(&self, id: &str) -> Result<SessionSummary> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| CacheError::SessionNotFound(id.to_string()))?;
        session.close().await
    }

    /// Close every session, returning the summaries that closed cleanly
    pub async fn close_all(&self) -> Vec<SessionSummary> {
        let drained: Vec<Arc<SessionContext>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        let mut summaries = Vec::with_capacity(drained.len());
        for session in drained {
            match session.close().await {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!(session = %session.id(), error = %e, "session close failed"),
            }
        }
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Open session ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::engine::CacheEngine;
    use crate::cache::types::CacheBudget;
    use crate::knowledge::memory_repository::InMemoryRepository;
    use crate::telemetry::TelemetryCollector;

    fn session(id: &str) -> SessionContext {
        SessionContext::new(
            id,
            Arc::new(InMemoryRepository::new()),
            CacheEngine::new(CacheBudget::new(100).unwrap()),
            TelemetryCollector::new(),
        )
    }

    #[tokio::test]
    async fn test_register_and_close() {
        let manager = SessionManager::new();
        manager.register(session("b")).await.unwrap();
        manager.register(session("a")).await.unwrap();
        assert_eq!(manager.ids().await, vec!["a", "b"]);

        let summary = manager.close("a").await.unwrap();
        assert_eq!(summary.session_id, "a");
        assert!(!manager.contains("a").await);
        assert!(matches!(manager.get("a").await, Err(CacheError::SessionNotFound(_))));
        assert!(matches!(manager.close("a").await, Err(CacheError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let manager = SessionManager::new();
        manager.register(session("a")).await.unwrap();
        assert!(manager.register(session("a")).await.is_err());
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let manager = SessionManager::new();
        manager.register(session("x")).await.unwrap();
        manager.register(session("y")).await.unwrap();

        let summaries = manager.close_all().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session_id, "x");
        assert!(manager.is_empty().await);
    }
}
