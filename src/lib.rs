//! Emberline - engagement-ranked timeline pipeline
//!
//! Emberline turns a stream of engagement events (views, bookmarks,
//! favorites, reposts) into a weighted content ranking and serves it as
//! a paginated timeline with per-client session pinning, backed by a
//! shared keyed store such as Redis.
//!
//! ## Services
//!
//! - **Cache**: bounded recency cache and time-windowed weighted log
//! - **Engage**: engagement event producer with per-user deduplication
//! - **Jobs**: at-least-once job queues, worker pools and the eviction janitor
//! - **Timeline**: session-pinned ranked selector with cursor pagination
//! - **Store**: keyed store abstraction over Redis with an in-memory double

pub mod cache;
pub mod engage;
pub mod jobs;
pub mod store;
pub mod timeline;
pub mod types;

pub use cache::{EngagementLog, Keyspace, RecencyCache};
pub use types::{ContentId, EmberlineError, Result};
