//! Error type shared by the cache backends

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a cache backend
///
/// Backends never swallow these; the orchestrator decides whether a failure
/// triggers a fallback, a miss, or a no-op write.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Redis command or connection failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No pooled connection became available before the checkout timeout
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// Filesystem read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache directory could not be created
    #[error("Cache directory unavailable: {}", .0.display())]
    Unavailable(PathBuf),

    /// The backend has been closed
    #[error("Backend is closed")]
    Closed,
}

impl From<r2d2::Error> for BackendError {
    fn from(err: r2d2::Error) -> Self {
        BackendError::PoolExhausted(err.to_string())
    }
}
