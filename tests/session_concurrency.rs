//! Concurrent sessions, deadlines and repository latency

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use pattern_cache::{
    cache::CacheBudget,
    knowledge::{ItemFilter, KnowledgeKind},
    CacheEngine, CacheError, EngineConfig, InMemoryRepository, ItemId, KnowledgeItem, KnowledgeRepository,
    PatternCacheService, Recommendation, SessionContext, TelemetryCollector,
};

/// Repository whose single-item fetches take `delay`
struct SlowRepository {
    inner: InMemoryRepository,
    delay: Duration,
}

#[async_trait]
impl KnowledgeRepository for SlowRepository {
    async fn find_similar(&self, embedding: &[f32], top_k: usize) -> pattern_cache::Result<Vec<KnowledgeItem>> {
        self.inner.find_similar(embedding, top_k).await
    }

    async fn find_by_filter(&self, filter: &ItemFilter) -> pattern_cache::Result<Vec<KnowledgeItem>> {
        self.inner.find_by_filter(filter).await
    }

    async fn increment_usage(&self, id: &ItemId) -> pattern_cache::Result<()> {
        self.inner.increment_usage(id).await
    }

    async fn get(&self, id: &ItemId) -> pattern_cache::Result<KnowledgeItem> {
        tokio::time::sleep(self.delay).await;
        self.inner.get(id).await
    }

    async fn adjust_importance(&self, id: &ItemId, delta: i32, reason: &str) -> pattern_cache::Result<()> {
        self.inner.adjust_importance(id, delta, reason).await
    }
}

/// Item costing exactly `tokens`
fn sized(id: &str, tokens: usize) -> KnowledgeItem {
    KnowledgeItem::new(id, KnowledgeKind::Factual, "", "x".repeat(tokens * 4 - 1))
}

fn rec(id: &str, confidence: f64) -> Recommendation {
    Recommendation {
        item_id: id.to_string(),
        confidence,
        rationale: "test".to_string(),
        matched_pattern_id: None,
    }
}

#[tokio::test]
async fn test_deadline_leaves_cache_untouched() {
    let repo = Arc::new(SlowRepository {
        inner: InMemoryRepository::with_items(vec![sized("a", 10), sized("b", 10)]),
        delay: Duration::from_millis(500),
    });
    let session = SessionContext::new(
        "slow",
        repo,
        CacheEngine::new(CacheBudget::new(100).unwrap()),
        TelemetryCollector::new(),
    );

    let result = session
        .warm_within(&[rec("a", 0.9), rec("b", 0.8)], CacheBudget::new(100).unwrap(), Duration::from_millis(20))
        .await;
    assert!(matches!(result, Err(CacheError::Cancelled(_))));
    assert!(session.cached_ids().await.is_empty());
    assert_eq!(session.stats().await.used_tokens, 0);

    let report = session
        .warm_within(&[rec("a", 0.9)], CacheBudget::new(100).unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(report.inserted, vec!["a"]);
}

#[tokio::test]
async fn test_lookups_proceed_while_another_warm_waits_on_io() {
    let repo = Arc::new(SlowRepository {
        inner: InMemoryRepository::with_items(vec![sized("a", 10), sized("b", 10)]),
        delay: Duration::from_millis(200),
    });
    let session = Arc::new(SessionContext::new(
        "s",
        repo,
        CacheEngine::new(CacheBudget::new(100).unwrap()),
        TelemetryCollector::new(),
    ));

    let warming = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.warm(&[rec("b", 0.9)], CacheBudget::new(100).unwrap()).await })
    };

    // The warm is parked on the repository, not on the session lock
    tokio::time::sleep(Duration::from_millis(20)).await;
    let lookup = tokio::time::timeout(Duration::from_millis(100), session.get("a")).await;
    assert!(matches!(lookup, Ok(Ok(None))));

    let report = warming.await.unwrap().unwrap();
    assert_eq!(report.inserted, vec!["b"]);
}

#[tokio::test]
async fn test_concurrent_sessions_are_isolated() {
    let items: Vec<KnowledgeItem> = (0..8).map(|i| sized(&format!("item{}", i), 30)).collect();
    let repo = Arc::new(InMemoryRepository::with_items(items));

    let mut config = EngineConfig::default();
    config.cache.budget_tokens = 100;
    let service = Arc::new(PatternCacheService::new(config, repo.clone()).unwrap());

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let session_id = format!("session{}", i);
            service.open_session_with_id(&session_id).await.unwrap();

            let own = format!("item{}", i);
            let next = format!("item{}", (i + 1) % 8);
            service
                .warm(&session_id, &[rec(&own, 0.9), rec(&next, 0.5)], CacheBudget::new(100).unwrap())
                .await
                .unwrap();
            for _ in 0..5 {
                assert!(service.get(&session_id, &own).await.unwrap().is_some());
            }
            session_id
        }));
    }

    for handle in handles {
        let session_id = handle.await.unwrap();
        let session = service.session(&session_id).await.unwrap();
        let stats = session.stats().await;
        assert_eq!(stats.entries, 2);
        assert!(stats.used_tokens <= stats.budget_tokens);
        assert_eq!(stats.hits, 5);
    }

    let summary = service.shutdown().await;
    assert_eq!(summary.sessions.len(), 8);
    for i in 0..8 {
        assert_eq!(repo.usage_of(&format!("item{}", i)).await, Some(5));
    }
    assert_eq!(service.telemetry().get_stats().cache_hits, 40);
}

#[tokio::test]
async fn test_read_during_parked_warm_keeps_budget() {
    let repo = Arc::new(SlowRepository {
        inner: InMemoryRepository::with_items(vec![sized("warmed", 60), sized("fetched", 60)]),
        delay: Duration::from_millis(150),
    });
    let session = Arc::new(SessionContext::new(
        "overlap",
        repo,
        CacheEngine::new(CacheBudget::new(100).unwrap()),
        TelemetryCollector::new(),
    ));

    let warming = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.warm(&[rec("warmed", 0.9)], CacheBudget::new(100).unwrap()).await })
    };

    // The warm is parked on the repository when the explicit read starts
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fetched = session.read("fetched").await.unwrap();
    assert_eq!(fetched.id, "fetched");

    let report = warming.await.unwrap().unwrap();

    let stats = session.stats().await;
    let cached = session.cached_ids().await;
    assert!(stats.used_tokens <= stats.budget_tokens);
    assert_eq!(stats.used_tokens, cached.len() * 60);
    assert_eq!(stats.entries, cached.len());
    // Only one 60-token item fits; the explicit read always ends up cached
    assert_eq!(cached, vec!["fetched"]);
    assert!(report.inserted.is_empty() || stats.evictions == 1);
}
