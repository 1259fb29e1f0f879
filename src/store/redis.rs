//! Redis-backed store shared across app processes and workers.

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, Direction};
use tracing::info;

use super::KeyedStore;
use crate::types::{EmberlineError, Result};

/// `KeyedStore` on a shared Redis instance.
///
/// Holds a `ConnectionManager` so every operation clones a cheap handle
/// onto one multiplexed connection instead of opening its own socket.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url`, for example `redis://127.0.0.1:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| EmberlineError::Store(format!("Invalid Redis URL: {e}")))?;
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_secs(2));
        let manager = client
            .get_connection_manager_with_config(config)
            .await
            .map_err(|e| EmberlineError::Store(format!("Failed to connect to Redis: {e}")))?;
        info!("Connected to Redis");
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn store_err(op: &str, e: redis::RedisError) -> EmberlineError {
    EmberlineError::Store(format!("{op} failed: {e}"))
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn push_back(&self, key: &str, items: &[String]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.rpush::<_, _, ()>(key, items.to_vec())
            .await
            .map_err(|e| store_err("RPUSH", e))
    }

    async fn range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.lrange(key, 0, -1).await.map_err(|e| store_err("LRANGE", e))
    }

    async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let count = match NonZeroUsize::new(count) {
            Some(count) => count,
            None => return Ok(Vec::new()),
        };
        let mut conn = self.conn();
        conn.lpop(key, Some(count)).await.map_err(|e| store_err("LPOP", e))
    }

    async fn remove_value(&self, key: &str, value: &str, count: usize) -> Result<u64> {
        let mut conn = self.conn();
        let removed: i64 = conn
            .lrem(key, count as isize, value)
            .await
            .map_err(|e| store_err("LREM", e))?;
        Ok(removed.max(0) as u64)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn();
        conn.llen(key).await.map_err(|e| store_err("LLEN", e))
    }

    async fn move_front(&self, src: &str, dst: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.lmove(src, dst, Direction::Left, Direction::Right)
            .await
            .map_err(|e| store_err("LMOVE", e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(key).await.map_err(|e| store_err("DEL", e))
    }

    async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| store_err("SET EX", e))
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(|e| store_err("GET", e))
    }
}
