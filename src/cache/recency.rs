//! Bounded insertion-ordered list of identifiers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::KeyedStore;
use crate::types::{ContentId, Result};

/// Fixed-capacity list of identifiers, oldest evicted first.
///
/// The list lives under one key in the shared store; every handle with
/// the same key sees the same list. After any mutation the list holds at
/// most `capacity` values, always the most recently added ones in their
/// original relative order.
#[derive(Clone)]
pub struct RecencyCache {
    store: Arc<dyn KeyedStore>,
    key: String,
    capacity: usize,
}

impl RecencyCache {
    pub fn new(store: Arc<dyn KeyedStore>, key: impl Into<String>, capacity: usize) -> Self {
        Self {
            store,
            key: key.into(),
            capacity,
        }
    }

    /// Append identifiers, evicting from the front to stay within
    /// capacity.
    ///
    /// A batch larger than the capacity keeps only its last `capacity`
    /// values, still in the caller's order.
    pub async fn add(&self, values: &[ContentId]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let current = self.store.list_len(&self.key).await?;
        let overflow = (current + values.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.store.pop_front(&self.key, overflow).await?;
        }
        let kept = if values.len() > self.capacity {
            &values[values.len() - self.capacity..]
        } else {
            values
        };
        let payloads: Vec<String> = kept.iter().map(|v| v.to_string()).collect();
        self.store.push_back(&self.key, &payloads).await?;
        debug!(key = %self.key, added = kept.len(), evicted = overflow, "Recency cache updated");
        Ok(())
    }

    /// The full list, oldest first.
    pub async fn all(&self) -> Result<Vec<ContentId>> {
        let payloads = self.store.range(&self.key).await?;
        let mut values = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            match payload.parse::<ContentId>() {
                Ok(value) => values.push(value),
                Err(_) => warn!(key = %self.key, payload = %payload, "Skipping non-numeric entry"),
            }
        }
        Ok(values)
    }

    /// Distinct identifiers ordered by descending occurrence count, ties
    /// broken by first-seen order.
    pub async fn frequent(&self) -> Result<Vec<ContentId>> {
        let values = self.all().await?;
        let mut counts: HashMap<ContentId, (usize, usize)> = HashMap::new();
        for (index, value) in values.iter().enumerate() {
            let entry = counts.entry(*value).or_insert((0, index));
            entry.0 += 1;
        }
        let mut scored: Vec<(ContentId, (usize, usize))> = counts.into_iter().collect();
        scored.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        });
        Ok(scored.into_iter().map(|(value, _)| value).collect())
    }

    /// Delete the backing list. Idempotent on an empty or missing list.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&self.key).await
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn cache(capacity: usize) -> RecencyCache {
        RecencyCache::new(Arc::new(MemoryStore::new()), "recent_views/v1:user:1", capacity)
    }

    #[tokio::test]
    async fn test_capacity_invariant_across_batches() {
        let cache = cache(5);
        cache.add(&[1, 2, 3]).await.unwrap();
        assert_eq!(cache.all().await.unwrap(), vec![1, 2, 3]);

        cache.add(&[4, 5, 6, 7]).await.unwrap();
        assert_eq!(cache.all().await.unwrap(), vec![3, 4, 5, 6, 7]);

        cache.add(&[8]).await.unwrap();
        assert_eq!(cache.all().await.unwrap(), vec![4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_oversized_batch_keeps_tail() {
        let cache = cache(3);
        cache.add(&[1, 2, 3, 4, 5, 6, 7]).await.unwrap();
        assert_eq!(cache.all().await.unwrap(), vec![5, 6, 7]);
    }

    #[tokio::test]
    async fn test_exact_fill_then_full_batch_replaces() {
        let cache = cache(3);
        cache.add(&[1, 2, 3]).await.unwrap();
        cache.add(&[4, 5, 6]).await.unwrap();
        assert_eq!(cache.all().await.unwrap(), vec![4, 5, 6]);
    }

    #[tokio::test]
    async fn test_empty_add_is_a_no_op() {
        let cache = cache(3);
        cache.add(&[]).await.unwrap();
        assert!(cache.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_frequent_orders_by_count_then_first_seen() {
        let cache = cache(10);
        cache.add(&[7, 8, 9, 8, 7, 8]).await.unwrap();
        // 8 three times, 7 twice, 9 once.
        assert_eq!(cache.frequent().await.unwrap(), vec![8, 7, 9]);
    }

    #[tokio::test]
    async fn test_frequent_tie_break_is_first_seen() {
        let cache = cache(10);
        cache.add(&[3, 1, 2]).await.unwrap();
        assert_eq!(cache.frequent().await.unwrap(), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let cache = cache(3);
        cache.clear().await.unwrap();
        cache.add(&[1, 2]).await.unwrap();
        cache.clear().await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.all().await.unwrap().is_empty());
    }
}
