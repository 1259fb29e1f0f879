//! Content resolution behind the timeline.
//!
//! The selector works with bare content ids; this module turns them into
//! renderable cards and applies visibility. The trait is the seam a real
//! database binds to, with an in-memory implementation for tests and
//! local runs.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use super::page::Direction;
use crate::types::{ContentId, Result};

/// A resolved piece of content, ready to serialize into a page.
#[derive(Debug, Clone, Serialize)]
pub struct ContentCard {
    pub id: ContentId,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub viewer_has_favorite: bool,
}

/// Visibility and filtering context for a resolution.
#[derive(Debug, Clone, Default)]
pub struct ContentQuery {
    /// Authenticated viewer, if any
    pub viewer: Option<u64>,
    /// Ids to drop from results
    pub exclude: Vec<ContentId>,
}

impl ContentQuery {
    pub fn for_viewer(viewer: u64) -> Self {
        Self {
            viewer: Some(viewer),
            ..Default::default()
        }
    }

    pub fn exclude(mut self, ids: Vec<ContentId>) -> Self {
        self.exclude = ids;
        self
    }
}

/// Source of truth for content.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Resolve ids into cards, preserving the input order.
    ///
    /// Ids that are deleted, excluded, or not visible to the viewer are
    /// dropped without error.
    async fn resolve_ordered(
        &self,
        ids: &[ContentId],
        query: &ContentQuery,
    ) -> Result<Vec<ContentCard>>;

    /// A window of recent content in descending id order.
    ///
    /// `Next` returns ids strictly below the cursor (newest first when
    /// the cursor is absent). `Prev` returns the ids strictly above the
    /// cursor that sit closest to it; an absent cursor has nothing
    /// above it.
    async fn recent_window(
        &self,
        cursor: Option<ContentId>,
        direction: Direction,
        limit: usize,
        query: &ContentQuery,
    ) -> Result<Vec<ContentCard>>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

struct ContentRow {
    id: ContentId,
    author_id: u64,
    created_at: DateTime<Utc>,
    text: String,
    /// Visible only to the author when set
    protected: bool,
    favorited_by: HashSet<u64>,
}

impl ContentRow {
    fn visible_to(&self, viewer: Option<u64>) -> bool {
        !self.protected || viewer == Some(self.author_id)
    }

    fn card(&self, viewer: Option<u64>) -> ContentCard {
        ContentCard {
            id: self.id,
            author_id: self.author_id,
            created_at: self.created_at,
            text: self.text.clone(),
            viewer_has_favorite: viewer.is_some_and(|v| self.favorited_by.contains(&v)),
        }
    }
}

/// Content store backed by a process-local map.
#[derive(Default)]
pub struct MemoryContentStore {
    rows: DashMap<ContentId, ContentRow>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ContentId, author_id: u64, text: impl Into<String>) {
        self.insert_row(id, author_id, text, false);
    }

    /// Insert content visible only to its author.
    pub fn insert_protected(&self, id: ContentId, author_id: u64, text: impl Into<String>) {
        self.insert_row(id, author_id, text, true);
    }

    fn insert_row(&self, id: ContentId, author_id: u64, text: impl Into<String>, protected: bool) {
        self.rows.insert(
            id,
            ContentRow {
                id,
                author_id,
                created_at: Utc::now(),
                text: text.into(),
                protected,
                favorited_by: HashSet::new(),
            },
        );
    }

    pub fn remove(&self, id: ContentId) {
        self.rows.remove(&id);
    }

    pub fn mark_favorite(&self, id: ContentId, viewer: u64) {
        if let Some(mut row) = self.rows.get_mut(&id) {
            row.favorited_by.insert(viewer);
        }
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn resolve_ordered(
        &self,
        ids: &[ContentId],
        query: &ContentQuery,
    ) -> Result<Vec<ContentCard>> {
        let excluded: HashSet<ContentId> = query.exclude.iter().copied().collect();
        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            if excluded.contains(id) {
                continue;
            }
            if let Some(row) = self.rows.get(id) {
                if row.visible_to(query.viewer) {
                    cards.push(row.card(query.viewer));
                }
            }
        }
        Ok(cards)
    }

    async fn recent_window(
        &self,
        cursor: Option<ContentId>,
        direction: Direction,
        limit: usize,
        query: &ContentQuery,
    ) -> Result<Vec<ContentCard>> {
        let excluded: HashSet<ContentId> = query.exclude.iter().copied().collect();
        let mut cards: Vec<ContentCard> = self
            .rows
            .iter()
            .filter(|row| !excluded.contains(&row.id) && row.visible_to(query.viewer))
            .filter(|row| match (direction, cursor) {
                (Direction::Next, None) => true,
                (Direction::Next, Some(c)) => row.id < c,
                (Direction::Prev, None) => false,
                (Direction::Prev, Some(c)) => row.id > c,
            })
            .map(|row| row.card(query.viewer))
            .collect();
        cards.sort_by(|a, b| b.id.cmp(&a.id));
        match direction {
            Direction::Next => cards.truncate(limit),
            Direction::Prev => {
                // Keep the rows nearest the cursor, dropping the newest.
                let excess = cards.len().saturating_sub(limit);
                if excess > 0 {
                    cards.drain(..excess);
                }
            }
        }
        Ok(cards)
    }
}
