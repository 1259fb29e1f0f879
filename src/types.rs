//! Shared result and error types for the timeline pipeline.

use thiserror::Error;

/// Identifier of one piece of rankable content.
pub type ContentId = u64;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EmberlineError>;

/// Errors surfaced by the pipeline.
///
/// Store failures are surfaced to the caller and never retried here;
/// the job layer wrapping each producer and janitor invocation owns
/// retries.
#[derive(Debug, Error)]
pub enum EmberlineError {
    /// Shared store operation failed (connection, I/O, protocol)
    #[error("Store error: {0}")]
    Store(String),

    /// A payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// The job queue is closed or rejected the job
    #[error("Queue error: {0}")]
    Queue(String),

    /// A pagination marker was not a valid offset
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}
