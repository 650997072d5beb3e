//! Error types for the sync engine.

use syncline_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A cycle is already running on this engine.
    #[error("sync already in progress")]
    AlreadySyncing,

    /// Network failure or non-success response.
    #[error("transport error: {message}")]
    Transport {
        /// HTTP status, or `None` if no response was received.
        status: Option<u16>,
        /// Error message.
        message: String,
    },

    /// A message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store or cursor store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The transport was closed.
    #[error("not connected to server")]
    NotConnected,

    /// A caller-supplied setting is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Creates a transport error for a request that got no response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a transport error for a non-success status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns the HTTP status of a transport error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            SyncError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns true if re-running the cycle later may succeed.
    ///
    /// The engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { status: None, .. } => true,
            SyncError::Transport {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            SyncError::NotConnected | SyncError::AlreadySyncing => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
