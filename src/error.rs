//! Error types for stash
//!
//! All modules use `StashResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for stash operations
pub type StashResult<T> = Result<T, StashError>;

/// All errors that can occur in stash
#[derive(Error, Debug)]
pub enum StashError {
    // Lock errors
    #[error("Timed out after {waited:?} waiting for lock file {path} to clear")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Cannot lock: lock file already exists: {0}")]
    LockHeld(PathBuf),

    #[error("Cannot unlock: lock file does not exist: {0}")]
    LockNotHeld(PathBuf),

    #[error("Gave up acquiring lock file {path} after {attempts} attempts")]
    LockRetriesExhausted { path: PathBuf, attempts: u32 },

    // Store errors
    #[error("Cache file not found: {0}")]
    StoreNotFound(PathBuf),

    #[error("Cache file {path} is not decodable: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StashError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if error is retryable by the caller
    ///
    /// Lock timeouts and exhausted acquisition retries signal contention,
    /// not a broken store. A `StoreCorrupt` that survived the locked-load
    /// retries likely means a torn write from a crashed process and needs
    /// manual intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::LockRetriesExhausted { .. }
        )
    }
}
