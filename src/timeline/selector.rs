//! Session-pinned ranked timeline serving.
//!
//! A read with no live session computes the engagement ranking, and if
//! enough distinct candidates exist, pins the ranked id order under the
//! client's key before serving from it. Later reads inside the TTL slice
//! the pinned order, so pagination stays stable while producers keep
//! mutating the live ranking underneath. When the candidate pool is too
//! thin, or the ranking store is unreachable, the read degrades to a
//! reverse-chronological window instead of failing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::content::{ContentCard, ContentQuery, ContentStore};
use super::page::{self, Direction, Page, PageRequest, OFFSET_FIELD_ID, OFFSET_FIELD_RANK};
use super::session::{ClientKey, SessionStore};
use crate::cache::EngagementLog;
use crate::engage::EngagementRegistry;
use crate::types::{ContentId, Result};

/// Configuration for timeline serving.
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Distinct ranked candidates required before a session is pinned
    pub session_min_size: usize,
    /// Upper bound on a single page
    pub max_page_size: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            session_min_size: 500,
            max_page_size: 100,
        }
    }
}

/// Parameters for one timeline read.
#[derive(Debug, Clone)]
pub struct TimelineQuery {
    pub page: PageRequest,
    /// Overrides [`TimelineConfig::session_min_size`] when set
    pub session_min_size: Option<usize>,
    /// Drop content the viewer has already engaged with
    pub exclude_engaged: bool,
}

impl TimelineQuery {
    pub fn page(page: PageRequest) -> Self {
        Self {
            page,
            session_min_size: None,
            exclude_engaged: false,
        }
    }
}

/// Serves timeline pages from a pinned ranking, with a chronological
/// fallback.
#[derive(Clone)]
pub struct TimelineSelector {
    log: EngagementLog,
    sessions: SessionStore,
    content: Arc<dyn ContentStore>,
    registry: Arc<EngagementRegistry>,
    config: TimelineConfig,
}

impl TimelineSelector {
    pub fn new(
        log: EngagementLog,
        sessions: SessionStore,
        content: Arc<dyn ContentStore>,
        registry: Arc<EngagementRegistry>,
        config: TimelineConfig,
    ) -> Self {
        Self {
            log,
            sessions,
            content,
            registry,
            config,
        }
    }

    /// Serve one page of the client's timeline.
    ///
    /// Returns an error only for invalid pagination input or a content
    /// store failure; ranking-side failures degrade to the chronological
    /// fallback.
    pub async fn timeline(
        &self,
        client: &ClientKey,
        query: &TimelineQuery,
    ) -> Result<Page<ContentCard>> {
        let size = query.page.page_size.clamp(1, self.config.max_page_size);
        let mut content_query = ContentQuery {
            viewer: client.viewer_id(),
            exclude: Vec::new(),
        };
        if query.exclude_engaged {
            if let Some(viewer) = client.viewer_id() {
                content_query.exclude = self.registry.engaged_ids(viewer);
            }
        }

        // A live session fixes the id order for the whole walk.
        match self.sessions.fetch(client).await {
            Ok(Some(ids)) => {
                return self
                    .ranked_page(&ids, &query.page, size, &content_query)
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(client = %client, error = %e, "Session fetch failed, recomputing ranking");
            }
        }

        let ranked = match self.log.ranked().await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "Ranking unavailable, serving chronological order");
                return self
                    .chronological_page(&query.page, size, &content_query)
                    .await;
            }
        };

        let floor = query.session_min_size.unwrap_or(self.config.session_min_size);
        if ranked.len() < floor {
            debug!(
                candidates = ranked.len(),
                floor, "Candidate pool below floor, serving chronological order"
            );
            return self
                .chronological_page(&query.page, size, &content_query)
                .await;
        }

        // No negative caching on the fallback path; only a pool that met
        // the floor is ever pinned.
        match self.sessions.pin(client, &ranked).await {
            Ok(()) => info!(client = %client, candidates = ranked.len(), "Pinned ranked session"),
            Err(e) => {
                warn!(client = %client, error = %e, "Session pin failed, serving unpinned ranking");
            }
        }
        self.ranked_page(&ranked, &query.page, size, &content_query)
            .await
    }

    /// Cut one page out of a fixed ranked id order.
    ///
    /// The offset names a rank position. Ids that no longer resolve are
    /// dropped from the page, but the returned offset still advances past
    /// them so the client never stalls on a dead slice.
    async fn ranked_page(
        &self,
        ids: &[ContentId],
        page: &PageRequest,
        size: usize,
        query: &ContentQuery,
    ) -> Result<Page<ContentCard>> {
        let cursor = page::parse_offset(&page.current_offset)?;
        let total = ids.len();
        let (start, end) = match page.direction {
            Direction::Next => {
                let start = cursor.map_or(0, |c| (c as usize).saturating_add(1));
                let start = start.min(total);
                (start, (start + size).min(total))
            }
            Direction::Prev => {
                // An absent cursor has nothing before it.
                let end = cursor.map_or(0, |c| (c as usize).min(total));
                (end.saturating_sub(size), end)
            }
        };

        let results = self.content.resolve_ordered(&ids[start..end], query).await?;

        let rank_of: HashMap<ContentId, usize> = ids[start..end]
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, start + i))
            .collect();
        let boundary_rank = match page.direction {
            Direction::Next => results
                .last()
                .and_then(|card| rank_of.get(&card.id).copied())
                .or(if end > start { Some(end - 1) } else { None }),
            Direction::Prev => results
                .first()
                .and_then(|card| rank_of.get(&card.id).copied())
                .or(if end > start { Some(start) } else { None }),
        };
        let current_offset = boundary_rank
            .map(|rank| rank.to_string())
            .or_else(|| page.current_offset.clone());

        let has_next = match page.direction {
            Direction::Next => end < total,
            Direction::Prev => start > 0,
        };

        Ok(Page {
            results,
            has_next,
            current_offset,
            offset_field: OFFSET_FIELD_RANK,
        })
    }

    /// Serve a reverse-chronological window keyed by content id.
    async fn chronological_page(
        &self,
        page: &PageRequest,
        size: usize,
        query: &ContentQuery,
    ) -> Result<Page<ContentCard>> {
        let cursor = page::parse_offset(&page.current_offset)?;
        let mut results = self
            .content
            .recent_window(cursor, page.direction, size + 1, query)
            .await?;
        let has_next = results.len() > size;
        if has_next {
            match page.direction {
                Direction::Next => results.truncate(size),
                Direction::Prev => {
                    results.remove(0);
                }
            }
        }
        let current_offset = match page.direction {
            Direction::Next => results.last().map(|card| card.id.to_string()),
            Direction::Prev => results.first().map(|card| card.id.to_string()),
        }
        .or_else(|| page.current_offset.clone());

        Ok(Page {
            results,
            has_next,
            current_offset,
            offset_field: OFFSET_FIELD_ID,
        })
    }
}
