//! Error taxonomy: connection/queue, job, and worker categories.

use thiserror::Error;

/// All fallible operations in this crate return this error.
///
/// Variants are grouped by category rather than split into separate
/// public types, so a single tagged enum already distinguishes failure
/// modes.
#[derive(Error, Debug)]
pub enum JetError {
    // --- connection / queue category -----------------------------------
    #[error("failed to reach redis: {0}")]
    Connection(#[from] redis::RedisError),

    #[error("queue is not ready")]
    NotReady,

    #[error("malformed job record: {0}")]
    MalformedRecord(#[from] serde_json::Error),

    #[error("corrupted job id in key-space: {0}")]
    CorruptedId(String),

    // --- job category ----------------------------------------------------
    #[error("job not found: {0}")]
    JobNotFound(String),

    // --- worker category ---------------------------------------------------
    #[error("worker failed to initialize: {0}")]
    WorkerInit(String),

    #[error("a handler is already installed on this worker")]
    DuplicateHandler,

    #[error("job timeout")]
    Timeout,
}

pub type JetResult<T> = Result<T, JetError>;
