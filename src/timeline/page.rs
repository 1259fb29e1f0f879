//! Cursor pagination types.
//!
//! A page request carries the offset returned by the previous page and a
//! direction. The offset is opaque to clients; the response names the
//! field it was drawn from so clients can tell ranked pages from
//! chronological ones.

use serde::{Deserialize, Serialize};

use crate::types::{EmberlineError, Result};

/// Offset field for pages cut from a pinned ranking.
pub const OFFSET_FIELD_RANK: &str = "rank";
/// Offset field for reverse-chronological fallback pages.
pub const OFFSET_FIELD_ID: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

/// A request for one page of a timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    /// Offset returned by the previous page, absent for the first page
    pub current_offset: Option<String>,
    pub direction: Direction,
    pub page_size: usize,
}

impl PageRequest {
    /// The first page of a timeline.
    pub fn first(page_size: usize) -> Self {
        Self {
            current_offset: None,
            direction: Direction::Next,
            page_size,
        }
    }

    /// The page after the one that returned `offset`.
    pub fn next(offset: impl Into<String>, page_size: usize) -> Self {
        Self {
            current_offset: Some(offset.into()),
            direction: Direction::Next,
            page_size,
        }
    }

    /// The page before the one that returned `offset`.
    pub fn prev(offset: impl Into<String>, page_size: usize) -> Self {
        Self {
            current_offset: Some(offset.into()),
            direction: Direction::Prev,
            page_size,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    /// Whether more results exist in the requested direction
    pub has_next: bool,
    /// Offset to hand back for the adjacent page, if any
    pub current_offset: Option<String>,
    /// Which field the offset indexes
    pub offset_field: &'static str,
}

/// Parse a client-supplied offset into a position.
pub(crate) fn parse_offset(offset: &Option<String>) -> Result<Option<u64>> {
    match offset {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| EmberlineError::InvalidCursor(format!("{raw:?}: {e}"))),
    }
}
