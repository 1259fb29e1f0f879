//! In-process store for tests and single-node deployments.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::KeyedStore;
use crate::types::Result;

struct ScalarEntry {
    value: String,
    expires_at: Instant,
}

impl ScalarEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// `KeyedStore` backed by `DashMap`.
///
/// Lists and scalars live in separate maps so a list key never aliases a
/// scalar key. TTL enforcement happens on read, which is how the Redis
/// backend looks from the caller's side.
#[derive(Default)]
pub struct MemoryStore {
    lists: DashMap<String, Vec<String>>,
    scalars: DashMap<String, ScalarEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn push_back(&self, key: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.lists
            .entry(key.to_string())
            .or_default()
            .extend(items.iter().cloned());
        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.lists.get(key).map(|list| list.clone()).unwrap_or_default())
    }

    async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        match self.lists.get_mut(key) {
            Some(mut list) => {
                let take = count.min(list.len());
                Ok(list.drain(..take).collect())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn remove_value(&self, key: &str, value: &str, count: usize) -> Result<u64> {
        match self.lists.get_mut(key) {
            Some(mut list) => {
                let before = list.len();
                if count == 0 {
                    list.retain(|item| item != value);
                } else {
                    let mut left = count;
                    list.retain(|item| {
                        if left > 0 && item == value {
                            left -= 1;
                            false
                        } else {
                            true
                        }
                    });
                }
                Ok((before - list.len()) as u64)
            }
            None => Ok(0),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        Ok(self.lists.get(key).map(|list| list.len()).unwrap_or(0))
    }

    async fn move_front(&self, src: &str, dst: &str) -> Result<Option<String>> {
        // Both keys live in the same map, so the source guard must drop
        // before the destination entry is touched.
        let item = {
            match self.lists.get_mut(src) {
                Some(mut list) if !list.is_empty() => Some(list.remove(0)),
                _ => None,
            }
        };
        if let Some(value) = item {
            self.lists
                .entry(dst.to_string())
                .or_default()
                .push(value.clone());
            return Ok(Some(value));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lists.remove(key);
        self.scalars.remove(key);
        Ok(())
    }

    async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.scalars.insert(
            key.to_string(),
            ScalarEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.scalars.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.scalars.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_push_and_range_preserve_order() {
        let store = MemoryStore::new();
        store.push_back("k", &items(&["a", "b"])).await.unwrap();
        store.push_back("k", &items(&["c"])).await.unwrap();
        assert_eq!(store.range("k").await.unwrap(), items(&["a", "b", "c"]));
        assert_eq!(store.list_len("k").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_empty() {
        let store = MemoryStore::new();
        assert!(store.range("missing").await.unwrap().is_empty());
        assert_eq!(store.list_len("missing").await.unwrap(), 0);
        assert!(store.pop_front("missing", 3).await.unwrap().is_empty());
        assert_eq!(store.remove_value("missing", "x", 0).await.unwrap(), 0);
        store.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_pop_front_clamps_to_length() {
        let store = MemoryStore::new();
        store.push_back("k", &items(&["a", "b", "c"])).await.unwrap();
        let popped = store.pop_front("k", 10).await.unwrap();
        assert_eq!(popped, items(&["a", "b", "c"]));
        assert!(store.range("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_value_count_semantics() {
        let store = MemoryStore::new();
        store.push_back("k", &items(&["x", "y", "x", "x"])).await.unwrap();

        assert_eq!(store.remove_value("k", "x", 1).await.unwrap(), 1);
        assert_eq!(store.range("k").await.unwrap(), items(&["y", "x", "x"]));

        assert_eq!(store.remove_value("k", "x", 0).await.unwrap(), 2);
        assert_eq!(store.range("k").await.unwrap(), items(&["y"]));
    }

    #[tokio::test]
    async fn test_move_front_between_lists() {
        let store = MemoryStore::new();
        store.push_back("src", &items(&["a", "b"])).await.unwrap();

        assert_eq!(store.move_front("src", "dst").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.range("src").await.unwrap(), items(&["b"]));
        assert_eq!(store.range("dst").await.unwrap(), items(&["a"]));

        store.move_front("src", "dst").await.unwrap();
        assert_eq!(store.move_front("src", "dst").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scalar_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .put_with_ttl("s", "v", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.fetch("s").await.unwrap(), Some("v".to_string()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.fetch("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_covers_lists_and_scalars() {
        let store = MemoryStore::new();
        store.push_back("k", &items(&["a"])).await.unwrap();
        store
            .put_with_ttl("k", "v", Duration::from_secs(60))
            .await
            .unwrap();

        store.delete("k").await.unwrap();
        assert!(store.range("k").await.unwrap().is_empty());
        assert_eq!(store.fetch("k").await.unwrap(), None);
    }
}
