//! Typed jobs connecting engagement producers to the weighted log.
//!
//! Delivery is at least once everywhere in this module. The log absorbs
//! a duplicate record as bounded over-counting of a single event, so a
//! retried or twice-delivered job is simply applied again; nothing here
//! tracks exactly-once state.
//!
//! Two queue shapes cover the two deployment shapes:
//!
//! - [`queue::JobQueue`] + [`queue::WorkerPool`]: a bounded in-process
//!   channel for single-node deployments
//! - [`durable::DurableQueue`]: pending and processing lists in the
//!   shared store, for producers and workers in different processes

pub mod durable;
pub mod janitor;
pub mod queue;

pub use durable::{spawn_consumers, ClaimedJob, ConsumerConfig, DurableQueue};
pub use janitor::{run_sweep, spawn_janitor_task, JanitorConfig};
pub use queue::{JobQueue, WorkerPool, WorkerPoolConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::EngagementLog;
use crate::types::{ContentId, Result};

/// Job payload understood by the workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Append one weighted record to the engagement log
    PushWeighted {
        content_id: ContentId,
        weight: i64,
        recorded_at: DateTime<Utc>,
    },
}

/// A job plus its delivery-attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job: Job,
    pub attempts: u32,
}

impl JobEnvelope {
    pub fn new(job: Job) -> Self {
        Self { job, attempts: 0 }
    }
}

/// Anything that accepts jobs for asynchronous execution.
///
/// Producers hold a sink rather than a concrete queue, so the same
/// producer code runs against the in-process channel or the durable
/// store-backed queue.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, job: Job) -> Result<()>;
}

/// Apply one job against the engagement log.
pub(crate) async fn apply(job: &Job, log: &EngagementLog) -> Result<()> {
    match job {
        Job::PushWeighted {
            content_id,
            weight,
            recorded_at,
        } => {
            log.add(&[*content_id], *weight).await?;
            let lag_ms = (Utc::now() - *recorded_at).num_milliseconds();
            debug!(content_id = *content_id, weight = *weight, lag_ms, "Applied weighted push");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_format_is_tagged() {
        let job = Job::PushWeighted {
            content_id: 7,
            weight: 5,
            recorded_at: Utc::now(),
        };
        let encoded = serde_json::to_string(&JobEnvelope::new(job)).unwrap();
        assert!(encoded.contains("\"kind\":\"push_weighted\""));
        assert!(encoded.contains("\"attempts\":0"));

        let decoded: JobEnvelope = serde_json::from_str(&encoded).unwrap();
        match decoded.job {
            Job::PushWeighted { content_id, weight, .. } => {
                assert_eq!(content_id, 7);
                assert_eq!(weight, 5);
            }
        }
    }
}
