//! Periodic eviction of expired engagement records.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{EngagementLog, EvictionReport};
use crate::types::{EmberlineError, Result};

/// Configuration for the eviction sweep.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Time between sweeps
    pub sweep_interval: Duration,
    /// Age at which records become eligible for eviction
    pub retention: Duration,
    /// Minimum distinct values to keep ranked, if set
    pub floor: Option<usize>,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60), // 1 minute
            retention: Duration::from_secs(86400),   // 1 day
            floor: None,
        }
    }
}

/// Run a single eviction sweep against the log.
pub async fn run_sweep(log: &EngagementLog, config: &JanitorConfig) -> Result<EvictionReport> {
    let retention = chrono::Duration::from_std(config.retention)
        .map_err(|e| EmberlineError::Internal(format!("Retention out of range: {e}")))?;
    let cutoff = chrono::Utc::now() - retention;
    log.evict_older_than(cutoff, config.floor).await
}

/// Spawn the background sweep loop.
///
/// The task runs until aborted; the worker binary owns its lifetime.
pub fn spawn_janitor_task(log: EngagementLog, config: JanitorConfig) -> JoinHandle<()> {
    let interval_secs = config.sweep_interval.as_secs();
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(config.sweep_interval).await;
            match run_sweep(&log, &config).await {
                Ok(report) => {
                    debug!(
                        scanned = report.scanned,
                        deleted = report.deleted,
                        protected = report.protected,
                        "Eviction sweep complete"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Eviction sweep failed");
                }
            }
        }
    });
    info!(interval_secs, "Janitor task started");
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn log() -> EngagementLog {
        let store = Arc::new(MemoryStore::new());
        EngagementLog::new(store, "post_recommended/v2")
    }

    #[tokio::test]
    async fn test_sweep_evicts_everything_past_retention() {
        let log = log();
        log.add(&[1, 2, 3], 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let config = JanitorConfig {
            retention: Duration::ZERO,
            ..Default::default()
        };
        let report = run_sweep(&log, &config).await.unwrap();
        assert_eq!(report.deleted, 3);
        assert!(log.records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_respects_floor() {
        let log = log();
        log.add(&[1], 1).await.unwrap();
        log.add(&[2], 1).await.unwrap();
        log.add(&[3], 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let config = JanitorConfig {
            retention: Duration::ZERO,
            floor: Some(2),
            ..Default::default()
        };
        let report = run_sweep(&log, &config).await.unwrap();
        assert_eq!(report.protected, 2);
        assert_eq!(log.ranked().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_records() {
        let log = log();
        log.add(&[1, 2], 1).await.unwrap();

        let report = run_sweep(&log, &JanitorConfig::default()).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(log.records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_janitor_task_sweeps_in_background() {
        let log = log();
        log.add(&[1], 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let config = JanitorConfig {
            sweep_interval: Duration::from_millis(20),
            retention: Duration::ZERO,
            floor: None,
        };
        let handle = spawn_janitor_task(log.clone(), config);
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(log.records().await.unwrap().is_empty());
    }
}
