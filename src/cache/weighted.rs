//! Weighted engagement log - append-only multiset with ranking and expiry.
//!
//! Every engagement event lands as its own `(value, weight, created_at)`
//! record on a list in the shared store. Nothing is merged in place:
//! repeated engagement on the same value accumulates as separate records,
//! and an engagement being revoked appends a negative-weight record
//! rather than deleting anything. That keeps each event individually
//! auditable and removable, at the cost of ranking reads summing over the
//! whole window.
//!
//! Expiry is a step function. A record carries full weight until the
//! janitor's cutoff passes it, then it is deleted; there is no decay
//! curve in between.
//!
//! ## Concurrency
//!
//! Producers append and the janitor evicts without any locking; the log
//! tolerates eventual consistency instead. An eviction pass only touches
//! records it saw in its own snapshot, so a record appended mid-sweep is
//! never wrongly deleted, and a record that outlives its cutoff by one
//! sweep is staleness, not corruption.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::KeyedStore;
use crate::types::{ContentId, EmberlineError, Result};

// ============================================================================
// Records
// ============================================================================

/// One logged engagement event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Content the event applies to
    pub value: ContentId,
    /// Signed weight; negative weights reverse earlier engagement
    pub weight: i64,
    /// Stamped by the log at insertion, never by the caller
    pub created_at: DateTime<Utc>,
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    /// Records in the snapshot the pass examined
    pub scanned: usize,
    /// Records removed from the store
    pub deleted: usize,
    /// Stale records spared to keep the distinct-value floor
    pub protected: usize,
}

fn encode(record: &StoredRecord) -> Result<String> {
    serde_json::to_string(record)
        .map_err(|e| EmberlineError::Codec(format!("Failed to encode record: {e}")))
}

fn decode(payload: &str) -> Result<StoredRecord> {
    serde_json::from_str(payload)
        .map_err(|e| EmberlineError::Codec(format!("Failed to decode record: {e}")))
}

// ============================================================================
// Engagement Log
// ============================================================================

/// Append-only weighted record log under one key in the shared store.
///
/// All app processes and workers construct handles over the same key and
/// share one log. The key comes from configuration (see
/// [`Keyspace`](crate::cache::Keyspace)); the reference layout is
/// `post_recommended/v2`.
#[derive(Clone)]
pub struct EngagementLog {
    store: Arc<dyn KeyedStore>,
    key: String,
}

impl EngagementLog {
    pub fn new(store: Arc<dyn KeyedStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Append one record per value, all sharing `weight` and an
    /// insertion timestamp taken from the server clock.
    ///
    /// Returns the number of records appended.
    pub async fn add(&self, values: &[ContentId], weight: i64) -> Result<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let created_at = Utc::now();
        let mut payloads = Vec::with_capacity(values.len());
        for value in values {
            payloads.push(encode(&StoredRecord {
                value: *value,
                weight,
                created_at,
            })?);
        }
        self.store.push_back(&self.key, &payloads).await?;
        debug!(key = %self.key, count = values.len(), weight, "Appended weighted records");
        Ok(values.len())
    }

    /// Every stored record, decoded, in insertion order.
    ///
    /// Undecodable payloads are skipped with a warning; the next eviction
    /// pass deletes them.
    pub async fn records(&self) -> Result<Vec<StoredRecord>> {
        let payloads = self.store.range(&self.key).await?;
        let mut records = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            match decode(payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key = %self.key, error = %e, "Skipping undecodable record"),
            }
        }
        Ok(records)
    }

    /// Distinct values ordered by descending summed weight, ties broken
    /// by first-seen order in the log.
    ///
    /// Values whose weights sum to zero or below still appear, after
    /// every positive sum; a fully revoked engagement ranks at parity
    /// with no engagement, not above it.
    pub async fn ranked(&self) -> Result<Vec<ContentId>> {
        let records = self.records().await?;
        let mut totals: HashMap<ContentId, (i64, usize)> = HashMap::new();
        for (index, record) in records.iter().enumerate() {
            let entry = totals.entry(record.value).or_insert((0, index));
            entry.0 += record.weight;
        }
        let mut scored: Vec<(ContentId, i64, usize)> = totals
            .into_iter()
            .map(|(value, (sum, first_seen))| (value, sum, first_seen))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        Ok(scored.into_iter().map(|(value, _, _)| value).collect())
    }

    /// Delete every record older than `cutoff` (strict: a record whose
    /// `created_at` equals the cutoff survives).
    ///
    /// With a `floor`, eviction additionally guarantees the ranked result
    /// keeps at least that many distinct values, sparing the newest stale
    /// records as needed so the janitor cannot starve the read path of
    /// candidates. Without a floor, deletion is unconditional on age.
    pub async fn evict_older_than(
        &self,
        cutoff: DateTime<Utc>,
        floor: Option<usize>,
    ) -> Result<EvictionReport> {
        let payloads = self.store.range(&self.key).await?;
        let scanned = payloads.len();

        // Values already covered by surviving records satisfy the floor
        // for free. Undecodable payloads count as stale with no value, so
        // a bad entry can never be protected and disappears here.
        let mut covered: HashSet<ContentId> = HashSet::new();
        let mut stale: Vec<(Option<ContentId>, &String)> = Vec::new();
        for payload in &payloads {
            match decode(payload) {
                Ok(record) if record.created_at >= cutoff => {
                    covered.insert(record.value);
                }
                Ok(record) => stale.push((Some(record.value), payload)),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Evicting undecodable record");
                    stale.push((None, payload));
                }
            }
        }

        // Walk stale records newest first, sparing one record per still
        // uncovered value until the floor holds.
        let mut protected: HashSet<&str> = HashSet::new();
        if let Some(floor) = floor {
            for (value, payload) in stale.iter().rev() {
                if covered.len() >= floor {
                    break;
                }
                if let Some(value) = value {
                    if covered.insert(*value) {
                        protected.insert(payload.as_str());
                    }
                }
            }
        }

        // Identical payloads are one removal: the store deletes by value,
        // and byte-identical records share a creation time, so they share
        // a fate either way.
        let mut deleted = 0u64;
        let mut requested: HashSet<&str> = HashSet::new();
        for (_, payload) in &stale {
            if protected.contains(payload.as_str()) {
                continue;
            }
            if !requested.insert(payload.as_str()) {
                continue;
            }
            deleted += self.store.remove_value(&self.key, payload, 0).await?;
        }

        let report = EvictionReport {
            scanned,
            deleted: deleted as usize,
            protected: protected.len(),
        };
        if report.deleted > 0 || report.protected > 0 {
            debug!(
                key = %self.key,
                scanned = report.scanned,
                deleted = report.deleted,
                protected = report.protected,
                "Evicted expired records"
            );
        }
        Ok(report)
    }

    /// Delete the backing list. Idempotent on an empty or missing log.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&self.key).await
    }
}

// ============================================================================
// Tests
// ============================================================================
