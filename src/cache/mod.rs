//! Caches layered over the shared keyed store.
//!
//! - **Keyspace**: versioned key naming so format changes can roll out
//!   next to old data
//! - **RecencyCache**: bounded insertion-ordered list of identifiers
//! - **EngagementLog**: append-only weighted record log with ranking and
//!   time-based eviction, the heart of the timeline pipeline

pub mod keys;
pub mod recency;
pub mod weighted;

pub use keys::Keyspace;
pub use recency::RecencyCache;
pub use weighted::{EngagementLog, EvictionReport, StoredRecord};
