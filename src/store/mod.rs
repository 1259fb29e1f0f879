//! Shared keyed storage behind the caches.
//!
//! Every cache in this crate is written against a small list-and-scalar
//! store surface instead of a concrete backend. `MemoryStore` keeps
//! everything in process for tests and single-node deployments;
//! `RedisStore` maps the same verbs onto a shared Redis so app processes
//! and workers all see one view.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::types::Result;

/// Minimal keyed list and scalar surface the caches run on.
///
/// List keys hold ordered payload strings, oldest first. Scalar keys hold
/// one value with a TTL. Semantics follow the Redis verbs they map onto:
/// reading a missing key yields an empty result, deleting a missing key
/// succeeds.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Append payloads to the tail of the list at `key`.
    async fn push_back(&self, key: &str, items: &[String]) -> Result<()>;

    /// Read the whole list at `key`, oldest first.
    async fn range(&self, key: &str) -> Result<Vec<String>>;

    /// Pop up to `count` payloads from the head of the list.
    async fn pop_front(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Remove occurrences of `value` from the list, scanning head to tail.
    ///
    /// A `count` of zero removes every occurrence. Returns how many were
    /// removed.
    async fn remove_value(&self, key: &str, value: &str, count: usize) -> Result<u64>;

    /// Number of payloads in the list at `key`.
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Move the head of `src` to the tail of `dst`, returning the moved
    /// payload.
    async fn move_front(&self, src: &str, dst: &str) -> Result<Option<String>>;

    /// Delete a key, list or scalar. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Set the scalar at `key`, expiring after `ttl`.
    async fn put_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Read the scalar at `key`, if present and not expired.
    async fn fetch(&self, key: &str) -> Result<Option<String>>;
}
