//! Engagement events feeding the weighted log.
//!
//! The producer is the dedup boundary: one engagement row per viewer,
//! content and kind. Beneath it the log stays append-only, so revoking
//! an engagement appends the negated weight instead of deleting the
//! original record.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{Keyspace, RecencyCache};
use crate::jobs::{Job, JobSink};
use crate::store::KeyedStore;
use crate::types::{ContentId, Result};

// ============================================================================
// Weighting Policy
// ============================================================================

/// Kind of engagement a viewer can record against content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    View,
    Bookmark,
    Favorite,
    Repost,
}

impl EngagementKind {
    /// Signal strength of this kind when ranking content.
    ///
    /// A repost is a far stronger interest signal than a view; the
    /// ladder in between encodes that product judgement.
    pub fn weight(self) -> i64 {
        match self {
            EngagementKind::View => 1,
            EngagementKind::Bookmark => 2,
            EngagementKind::Favorite => 5,
            EngagementKind::Repost => 10,
        }
    }
}

// ============================================================================
// Dedup Registry
// ============================================================================

/// Registry enforcing one engagement per viewer, content and kind.
///
/// Stands in for the uniqueness constraint the surrounding system keeps
/// on its engagement rows. Double-submitting the same engagement is a
/// no-op here and never reaches the log.
#[derive(Default)]
pub struct EngagementRegistry {
    entries: DashMap<u64, HashSet<(ContentId, EngagementKind)>>,
}

impl EngagementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the engagement. Returns false when it already exists.
    pub fn insert(&self, user: u64, content: ContentId, kind: EngagementKind) -> bool {
        self.entries.entry(user).or_default().insert((content, kind))
    }

    /// Forget the engagement. Returns false when it was never recorded.
    pub fn remove(&self, user: u64, content: ContentId, kind: EngagementKind) -> bool {
        match self.entries.get_mut(&user) {
            Some(mut set) => set.remove(&(content, kind)),
            None => false,
        }
    }

    pub fn contains(&self, user: u64, content: ContentId, kind: EngagementKind) -> bool {
        self.entries
            .get(&user)
            .map(|set| set.contains(&(content, kind)))
            .unwrap_or(false)
    }

    /// Distinct content this viewer has engaged with in any way, sorted
    /// for deterministic filtering.
    pub fn engaged_ids(&self, user: u64) -> Vec<ContentId> {
        match self.entries.get(&user) {
            Some(set) => {
                let mut ids: Vec<ContentId> = set.iter().map(|(content, _)| *content).collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
            None => Vec::new(),
        }
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Configuration for the engagement producer.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Namespace for per-viewer recently-viewed lists
    pub recent_views: Keyspace,
    /// Capacity of each recently-viewed list
    pub recent_capacity: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            recent_views: Keyspace::new("recent_views", 1),
            recent_capacity: 100,
        }
    }
}

/// Turns viewer engagement into weighted log jobs.
///
/// Weighting happens here, at the edge: the job carries a plain signed
/// weight and the workers never see the engagement kind. Views also land
/// in the viewer's bounded recently-viewed list.
pub struct EngagementProducer {
    registry: Arc<EngagementRegistry>,
    sink: Arc<dyn JobSink>,
    store: Arc<dyn KeyedStore>,
    config: ProducerConfig,
}

impl EngagementProducer {
    pub fn new(
        registry: Arc<EngagementRegistry>,
        sink: Arc<dyn JobSink>,
        store: Arc<dyn KeyedStore>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            registry,
            sink,
            store,
            config,
        }
    }

    /// Record one engagement, enqueueing its weight for the log.
    ///
    /// Returns false when the same engagement already exists and nothing
    /// was enqueued. A failed enqueue rolls the registry back so the
    /// caller can retry with the same arguments. The recently-viewed
    /// append runs only after the job is accepted and is best-effort; a
    /// store failure there is logged, not surfaced.
    pub async fn record(&self, user: u64, content: ContentId, kind: EngagementKind) -> Result<bool> {
        if !self.registry.insert(user, content, kind) {
            debug!(user, content, kind = ?kind, "Duplicate engagement ignored");
            return Ok(false);
        }
        let job = Job::PushWeighted {
            content_id: content,
            weight: kind.weight(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.sink.submit(job).await {
            self.registry.remove(user, content, kind);
            return Err(e);
        }
        if kind == EngagementKind::View {
            if let Err(e) = self.recent_views_for(user).add(&[content]).await {
                warn!(user, content, error = %e, "Recently-viewed append failed");
            }
        }
        Ok(true)
    }

    /// Revoke a previously recorded engagement by enqueueing the negated
    /// weight.
    ///
    /// Returns false when there was nothing to revoke.
    pub async fn revoke(&self, user: u64, content: ContentId, kind: EngagementKind) -> Result<bool> {
        if !self.registry.remove(user, content, kind) {
            return Ok(false);
        }
        let job = Job::PushWeighted {
            content_id: content,
            weight: -kind.weight(),
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.sink.submit(job).await {
            self.registry.insert(user, content, kind);
            return Err(e);
        }
        Ok(true)
    }

    /// Content this viewer saw most recently, oldest first.
    pub async fn recently_viewed(&self, user: u64) -> Result<Vec<ContentId>> {
        self.recent_views_for(user).all().await
    }

    pub fn registry(&self) -> &Arc<EngagementRegistry> {
        &self.registry
    }

    fn recent_views_for(&self, user: u64) -> RecencyCache {
        RecencyCache::new(
            Arc::clone(&self.store),
            self.config.recent_views.scoped(&format!("user:{user}")),
            self.config.recent_capacity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobQueue;
    use crate::store::MemoryStore;
    use crate::types::EmberlineError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_weight_ladder() {
        assert_eq!(EngagementKind::View.weight(), 1);
        assert_eq!(EngagementKind::Bookmark.weight(), 2);
        assert_eq!(EngagementKind::Favorite.weight(), 5);
        assert_eq!(EngagementKind::Repost.weight(), 10);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let registry = EngagementRegistry::new();
        assert!(registry.insert(1, 7, EngagementKind::Favorite));
        assert!(!registry.insert(1, 7, EngagementKind::Favorite));
        // Same content, different kind, is a separate engagement.
        assert!(registry.insert(1, 7, EngagementKind::Repost));
        // Same engagement from another viewer is independent.
        assert!(registry.insert(2, 7, EngagementKind::Favorite));
    }

    #[test]
    fn test_registry_remove_round_trip() {
        let registry = EngagementRegistry::new();
        assert!(!registry.remove(1, 7, EngagementKind::View));
        registry.insert(1, 7, EngagementKind::View);
        assert!(registry.contains(1, 7, EngagementKind::View));
        assert!(registry.remove(1, 7, EngagementKind::View));
        assert!(!registry.contains(1, 7, EngagementKind::View));
    }

    #[test]
    fn test_engaged_ids_are_distinct_and_sorted() {
        let registry = EngagementRegistry::new();
        registry.insert(1, 9, EngagementKind::View);
        registry.insert(1, 3, EngagementKind::View);
        registry.insert(1, 9, EngagementKind::Favorite);
        assert_eq!(registry.engaged_ids(1), vec![3, 9]);
        assert!(registry.engaged_ids(2).is_empty());
    }

    /// Store that rejects pushes under one key prefix, for exercising
    /// the best-effort recently-viewed append.
    struct PrefixOutageStore {
        inner: MemoryStore,
        prefix: &'static str,
    }

    #[async_trait]
    impl KeyedStore for PrefixOutageStore {
        async fn push_back(&self, key: &str, items: &[String]) -> Result<()> {
            if key.starts_with(self.prefix) {
                return Err(EmberlineError::Store("injected failure".into()));
            }
            self.inner.push_back(key, items).await
        }

        async fn range(&self, key: &str) -> Result<Vec<String>> {
            self.inner.range(key).await
        }

        async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>> {
            self.inner.pop_front(key, count).await
        }

        async fn remove_value(&self, key: &str, value: &str, count: usize) -> Result<u64> {
            self.inner.remove_value(key, value, count).await
        }

        async fn list_len(&self, key: &str) -> Result<usize> {
            self.inner.list_len(key).await
        }

        async fn move_front(&self, src: &str, dst: &str) -> Result<Option<String>> {
            self.inner.move_front(src, dst).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key).await
        }

        async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.inner.put_with_ttl(key, value, ttl).await
        }

        async fn fetch(&self, key: &str) -> Result<Option<String>> {
            self.inner.fetch(key).await
        }
    }

    #[tokio::test]
    async fn test_view_survives_recent_views_outage() {
        let store: Arc<dyn KeyedStore> = Arc::new(PrefixOutageStore {
            inner: MemoryStore::new(),
            prefix: "recent_views",
        });
        let (queue, mut rx) = JobQueue::bounded(4);
        let producer = EngagementProducer::new(
            Arc::new(EngagementRegistry::new()),
            Arc::new(queue),
            store,
            ProducerConfig::default(),
        );

        assert!(producer.record(9, 1, EngagementKind::View).await.unwrap());

        // The weighted job still went out; only the exclusion aid is lost.
        let envelope = rx.try_recv().unwrap();
        assert!(matches!(
            envelope.job,
            Job::PushWeighted { content_id: 1, weight: 1, .. }
        ));
        assert!(producer.registry().contains(9, 1, EngagementKind::View));
        assert!(producer.recently_viewed(9).await.unwrap().is_empty());
    }

    /// Sink whose first few submits fail, for exercising producer
    /// rollback.
    struct FlakySink {
        inner: JobQueue,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl JobSink for FlakySink {
        async fn submit(&self, job: Job) -> Result<()> {
            let left = self.failures_left.load(Ordering::Relaxed);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::Relaxed);
                return Err(EmberlineError::Queue("injected failure".into()));
            }
            self.inner.submit(job).await
        }
    }

    #[tokio::test]
    async fn test_failed_enqueue_rolls_back_for_retry() {
        let store: Arc<dyn KeyedStore> = Arc::new(MemoryStore::new());
        let (queue, mut rx) = JobQueue::bounded(4);
        let sink = Arc::new(FlakySink {
            inner: queue,
            failures_left: AtomicU32::new(1),
        });
        let registry = Arc::new(EngagementRegistry::new());
        let producer = EngagementProducer::new(
            Arc::clone(&registry),
            sink,
            store,
            ProducerConfig::default(),
        );

        let err = producer.record(9, 1, EngagementKind::View).await.unwrap_err();
        assert!(matches!(err, EmberlineError::Queue(_)));
        assert!(!registry.contains(9, 1, EngagementKind::View));

        // Same arguments go through once the sink recovers.
        assert!(producer.record(9, 1, EngagementKind::View).await.unwrap());
        assert!(rx.try_recv().is_ok());
        assert_eq!(producer.recently_viewed(9).await.unwrap(), vec![1]);
    }
}
