//! Ranked timeline assembly.
//!
//! The selector pins a ranked snapshot per client session, pages through
//! it by rank position, and falls back to a reverse-chronological window
//! keyed by id when the ranking is too thin to serve.

pub mod content;
pub mod page;
pub mod selector;
pub mod session;

pub use content::{ContentCard, ContentQuery, ContentStore, MemoryContentStore};
pub use page::{Direction, Page, PageRequest, OFFSET_FIELD_ID, OFFSET_FIELD_RANK};
pub use selector::{TimelineConfig, TimelineQuery, TimelineSelector};
pub use session::{ClientKey, SessionStore, DEFAULT_SESSION_TTL};
