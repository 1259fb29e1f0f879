//! In-process job queue and worker pool.
//!
//! Single-node twin of the durable queue: producers hand jobs to a
//! bounded channel and a fixed pool of workers applies them to the
//! engagement log. Workers retry a failed job in place before dropping
//! it; once every sending handle is gone the pool drains and shuts down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{apply, Job, JobEnvelope, JobSink};
use crate::cache::EngagementLog;
use crate::types::{EmberlineError, Result};

/// Configuration for the in-process worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks
    pub worker_count: usize,
    /// Queued jobs before enqueue waits for room
    pub max_queue_size: usize,
    /// Delivery attempts per job before it is dropped
    pub max_attempts: u32,
    /// Pause between attempts on one job
    pub retry_delay: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_queue_size: 1000,
            max_attempts: 3,
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// Sending half of the in-process queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobEnvelope>,
}

impl JobQueue {
    /// Create a queue; the receiving half goes to [`WorkerPool::start`].
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<JobEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        self.tx
            .send(JobEnvelope::new(job))
            .await
            .map_err(|_| EmberlineError::Queue("Job queue closed".into()))
    }
}

#[async_trait]
impl JobSink for JobQueue {
    async fn submit(&self, job: Job) -> Result<()> {
        self.enqueue(job).await
    }
}

/// Fixed pool of workers draining the queue into the engagement log.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Create a queue sized by the config and start workers over it.
    pub fn with_queue(config: WorkerPoolConfig, log: EngagementLog) -> (JobQueue, WorkerPool) {
        let (queue, rx) = JobQueue::bounded(config.max_queue_size);
        let pool = Self::start(config, rx, log);
        (queue, pool)
    }

    /// Spawn `config.worker_count` workers over the receiving half.
    pub fn start(
        config: WorkerPoolConfig,
        rx: mpsc::Receiver<JobEnvelope>,
        log: EngagementLog,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let processed = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let rx = Arc::clone(&rx);
            let log = log.clone();
            let config = config.clone();
            let processed = Arc::clone(&processed);
            let dropped = Arc::clone(&dropped);
            handles.push(tokio::spawn(async move {
                worker_task(worker_id, rx, log, config, processed, dropped).await;
            }));
        }

        info!(workers = config.worker_count, "Worker pool started");
        Self {
            handles,
            processed,
            dropped,
        }
    }

    /// Jobs applied successfully since the pool started.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Jobs dropped after exhausting their attempts.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Wait for every worker to finish. Workers exit once all sending
    /// handles of the queue are dropped and the channel is drained.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_task(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<JobEnvelope>>>,
    log: EngagementLog,
    config: WorkerPoolConfig,
    processed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
) {
    debug!(worker_id, "Worker starting");

    loop {
        let mut envelope = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(envelope) => envelope,
                None => {
                    debug!(worker_id, "Worker shutting down (channel closed)");
                    return;
                }
            }
        };

        loop {
            envelope.attempts += 1;
            match apply(&envelope.job, &log).await {
                Ok(()) => {
                    processed.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(e) if envelope.attempts < config.max_attempts => {
                    warn!(
                        worker_id,
                        attempts = envelope.attempts,
                        error = %e,
                        "Job failed, retrying"
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        worker_id,
                        attempts = envelope.attempts,
                        error = %e,
                        "Job dropped after final attempt"
                    );
                    dropped.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
    }
}
