//! Store-backed job queue shared across processes.
//!
//! Jobs are serialized onto a pending list in the shared store. A
//! consumer claims the oldest by moving it onto a processing list,
//! applies it, then removes it from the processing list. A claimed job
//! whose consumer died stays on the processing list until
//! [`DurableQueue::recover_orphans`] pushes it back to pending at the
//! next worker start. Delivery is therefore at least once, and a job in
//! flight during recovery can be applied twice; the log absorbs that as
//! bounded over-counting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{apply, Job, JobEnvelope, JobSink};
use crate::cache::{EngagementLog, Keyspace};
use crate::store::KeyedStore;
use crate::types::{EmberlineError, Result};

/// Configuration for durable queue consumers.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer tasks per process
    pub worker_count: usize,
    /// Delivery attempts per job before it is discarded
    pub max_attempts: u32,
    /// How long an idle consumer waits before polling again
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_attempts: 3,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// A job claimed off the pending list.
///
/// Carries the raw payload so acknowledgement can remove the exact list
/// entry that was claimed.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub envelope: JobEnvelope,
    raw: String,
}

/// Job queue persisted in the shared store.
#[derive(Clone)]
pub struct DurableQueue {
    store: Arc<dyn KeyedStore>,
    pending_key: String,
    processing_key: String,
}

impl DurableQueue {
    pub fn new(store: Arc<dyn KeyedStore>, keyspace: &Keyspace) -> Self {
        let pending_key = keyspace.key();
        let processing_key = format!("{pending_key}:processing");
        Self {
            store,
            pending_key,
            processing_key,
        }
    }

    /// Jobs waiting to be claimed.
    pub async fn pending_len(&self) -> Result<usize> {
        self.store.list_len(&self.pending_key).await
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        let payload = encode(&JobEnvelope::new(job))?;
        self.store.push_back(&self.pending_key, &[payload]).await
    }

    /// Claim the oldest pending job, moving it to the processing list.
    ///
    /// An undecodable payload is dropped from the processing list and
    /// reported as `None` for this poll.
    pub async fn claim(&self) -> Result<Option<ClaimedJob>> {
        let raw = match self
            .store
            .move_front(&self.pending_key, &self.processing_key)
            .await?
        {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match decode(&raw) {
            Ok(envelope) => Ok(Some(ClaimedJob { envelope, raw })),
            Err(e) => {
                warn!(key = %self.pending_key, error = %e, "Dropping undecodable job payload");
                self.store.remove_value(&self.processing_key, &raw, 1).await?;
                Ok(None)
            }
        }
    }

    /// Acknowledge a completed job.
    pub async fn ack(&self, claimed: &ClaimedJob) -> Result<()> {
        self.store
            .remove_value(&self.processing_key, &claimed.raw, 1)
            .await?;
        Ok(())
    }

    /// Return a failed job to the pending list with its attempt count
    /// bumped.
    pub async fn retry(&self, claimed: &ClaimedJob) -> Result<()> {
        let mut envelope = claimed.envelope.clone();
        envelope.attempts += 1;
        let payload = encode(&envelope)?;
        self.store.push_back(&self.pending_key, &[payload]).await?;
        self.store
            .remove_value(&self.processing_key, &claimed.raw, 1)
            .await?;
        Ok(())
    }

    /// Drop a failed job for good.
    pub async fn discard(&self, claimed: &ClaimedJob) -> Result<()> {
        self.store
            .remove_value(&self.processing_key, &claimed.raw, 1)
            .await?;
        Ok(())
    }

    /// Push every claimed-but-unacknowledged job back to pending.
    ///
    /// Run at worker start, before consumers spawn. Jobs still in flight
    /// in a live sibling process get requeued too and will be applied
    /// twice.
    pub async fn recover_orphans(&self) -> Result<usize> {
        let orphans = self.store.range(&self.processing_key).await?;
        if orphans.is_empty() {
            return Ok(0);
        }
        self.store.push_back(&self.pending_key, &orphans).await?;
        self.store.delete(&self.processing_key).await?;
        info!(key = %self.pending_key, count = orphans.len(), "Recovered orphaned jobs");
        Ok(orphans.len())
    }
}

#[async_trait]
impl JobSink for DurableQueue {
    async fn submit(&self, job: Job) -> Result<()> {
        self.enqueue(job).await
    }
}

fn encode(envelope: &JobEnvelope) -> Result<String> {
    serde_json::to_string(envelope)
        .map_err(|e| EmberlineError::Codec(format!("Failed to encode job: {e}")))
}

fn decode(raw: &str) -> Result<JobEnvelope> {
    serde_json::from_str(raw).map_err(|e| EmberlineError::Codec(format!("Failed to decode job: {e}")))
}

/// Spawn consumer tasks draining the durable queue into the log.
///
/// The tasks run until aborted; the worker binary owns their lifetime.
pub fn spawn_consumers(
    queue: DurableQueue,
    log: EngagementLog,
    config: ConsumerConfig,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(config.worker_count);
    for worker_id in 0..config.worker_count {
        let queue = queue.clone();
        let log = log.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            consumer_task(worker_id, queue, log, config).await;
        }));
    }
    info!(workers = config.worker_count, "Durable queue consumers started");
    handles
}

async fn consumer_task(
    worker_id: usize,
    queue: DurableQueue,
    log: EngagementLog,
    config: ConsumerConfig,
) {
    debug!(worker_id, "Consumer starting");

    loop {
        let claimed = match queue.claim().await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                tokio::time::sleep(config.poll_interval).await;
                continue;
            }
            Err(e) => {
                warn!(worker_id, error = %e, "Claim failed, backing off");
                tokio::time::sleep(config.poll_interval).await;
                continue;
            }
        };

        let attempts = claimed.envelope.attempts + 1;
        match apply(&claimed.envelope.job, &log).await {
            Ok(()) => {
                if let Err(e) = queue.ack(&claimed).await {
                    warn!(worker_id, error = %e, "Ack failed, job may be applied again");
                }
            }
            Err(e) if attempts < config.max_attempts => {
                warn!(worker_id, attempts, error = %e, "Job failed, requeueing");
                if let Err(e) = queue.retry(&claimed).await {
                    warn!(worker_id, error = %e, "Requeue failed, orphan recovery will pick it up");
                }
            }
            Err(e) => {
                error!(worker_id, attempts, error = %e, "Job discarded after final attempt");
                if let Err(e) = queue.discard(&claimed).await {
                    warn!(worker_id, error = %e, "Discard failed, orphan recovery may requeue it");
                }
            }
        }
    }
}
