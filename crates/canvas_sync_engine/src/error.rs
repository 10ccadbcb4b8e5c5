//! Error types for the sync engine.

use canvas_sync_protocol::ProtocolError;
use canvas_sync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote answered with something the protocol does not allow.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The server reported a version conflict that could not be settled in
    /// this cycle.
    #[error("version conflict: local={local}, remote={remote}")]
    VersionConflict {
        /// Local version.
        local: String,
        /// Remote version.
        remote: String,
    },

    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// State or message codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session was torn down.
    #[error("session torn down")]
    TornDown,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the next cycle may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::InvalidResponse(_) | SyncError::VersionConflict { .. } => true,
            _ => false,
        }
    }
}
