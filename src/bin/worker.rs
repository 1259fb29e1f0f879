//! Emberline Worker - Background processor for engagement jobs
//!
//! Run this binary alongside the web tier to drain the durable job
//! queue into the engagement log and to sweep expired records.
//!
//! Usage:
//!   emberline-worker --redis-url redis://localhost:6379
//!
//! Environment variables:
//!   REDIS_URL - Redis server URL (default: redis://127.0.0.1:6379)
//!   WORKER_ID - Unique worker identifier (default: auto-generated UUID)
//!   LOG_NAMESPACE / LOG_VERSION - Engagement log keyspace (default: post_recommended/v2)
//!   QUEUE_NAMESPACE / QUEUE_VERSION - Job queue keyspace (default: engagement_jobs/v1)
//!   CONSUMER_COUNT - Queue consumer tasks (default: 2)
//!   MAX_ATTEMPTS - Delivery attempts per job (default: 3)
//!   POLL_INTERVAL_MS - Idle consumer poll interval (default: 250)
//!   SWEEP_INTERVAL_SECS - Seconds between eviction sweeps (default: 60)
//!   RETENTION_SECS - Record retention window (default: 86400)
//!   EVICTION_FLOOR - Minimum distinct ranked values kept by sweeps (default: none)

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use emberline::cache::Keyspace;
use emberline::jobs::{spawn_consumers, spawn_janitor_task, ConsumerConfig, DurableQueue, JanitorConfig};
use emberline::store::{KeyedStore, RedisStore};
use emberline::EngagementLog;

#[derive(Parser, Debug)]
#[command(name = "emberline-worker")]
#[command(about = "Background worker for Emberline engagement processing")]
#[command(version)]
struct Args {
    /// Redis server URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Unique worker ID (auto-generated if not provided)
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    /// Engagement log key namespace
    #[arg(long, env = "LOG_NAMESPACE", default_value = "post_recommended")]
    log_namespace: String,

    /// Engagement log key version
    #[arg(long, env = "LOG_VERSION", default_value = "2")]
    log_version: u32,

    /// Job queue key namespace
    #[arg(long, env = "QUEUE_NAMESPACE", default_value = "engagement_jobs")]
    queue_namespace: String,

    /// Job queue key version
    #[arg(long, env = "QUEUE_VERSION", default_value = "1")]
    queue_version: u32,

    /// Queue consumer tasks
    #[arg(long, env = "CONSUMER_COUNT", default_value = "2")]
    consumer_count: usize,

    /// Delivery attempts per job before it is discarded
    #[arg(long, env = "MAX_ATTEMPTS", default_value = "3")]
    max_attempts: u32,

    /// Idle consumer poll interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "250")]
    poll_interval_ms: u64,

    /// Seconds between eviction sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "60")]
    sweep_interval_secs: u64,

    /// Engagement record retention in seconds
    #[arg(long, env = "RETENTION_SECS", default_value = "86400")]
    retention_secs: u64,

    /// Minimum distinct ranked values eviction must keep
    #[arg(long, env = "EVICTION_FLOOR")]
    eviction_floor: Option<usize>,
}

impl Args {
    fn validate(&self) -> Result<(), String> {
        if self.consumer_count == 0 {
            return Err("consumer-count must be at least 1".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max-attempts must be at least 1".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("sweep-interval-secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,emberline=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse arguments
    let args = Args::parse();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let worker_id = args
        .worker_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let log_keyspace = Keyspace::new(&args.log_namespace, args.log_version);
    let queue_keyspace = Keyspace::new(&args.queue_namespace, args.queue_version);

    info!(
        "Starting Emberline worker {} (Redis: {})",
        worker_id, args.redis_url
    );
    info!("Engagement log: {}", log_keyspace.key());
    info!("Job queue: {}", queue_keyspace.key());
    info!(
        "Consumers: {}, sweep every {}s, retention {}s, floor {:?}",
        args.consumer_count, args.sweep_interval_secs, args.retention_secs, args.eviction_floor
    );

    let store: Arc<dyn KeyedStore> = match RedisStore::connect(&args.redis_url).await {
        Ok(store) => {
            info!("Redis connected successfully");
            Arc::new(store)
        }
        Err(e) => {
            error!("Redis connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let log = EngagementLog::new(Arc::clone(&store), log_keyspace.key());
    let queue = DurableQueue::new(Arc::clone(&store), &queue_keyspace);

    // Requeue jobs a dead worker left claimed before consumers start.
    match queue.recover_orphans().await {
        Ok(0) => {}
        Ok(recovered) => info!("Requeued {} orphaned jobs", recovered),
        Err(e) => warn!("Orphan recovery failed: {}", e),
    }

    let consumer_config = ConsumerConfig {
        worker_count: args.consumer_count,
        max_attempts: args.max_attempts,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };
    let consumers = spawn_consumers(queue, log.clone(), consumer_config);

    let janitor_config = JanitorConfig {
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        retention: Duration::from_secs(args.retention_secs),
        floor: args.eviction_floor,
    };
    let janitor = spawn_janitor_task(log, janitor_config);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    for handle in consumers {
        handle.abort();
    }
    janitor.abort();
    info!("Worker shutting down");

    Ok(())
}
