//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A row with this id already exists.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// Stored data could not be interpreted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// A row or value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The embedded SQL engine failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A batch write exceeded the store's native limit.
    #[error("batch of {len} items exceeds limit of {max}")]
    BatchTooLarge {
        /// Items submitted.
        len: usize,
        /// Maximum items per batch.
        max: usize,
    },

    /// An item is missing a required attribute.
    #[error("invalid item: {0}")]
    InvalidItem(String),

    /// A name cannot be used as a table name.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Another handle holds the store's lock.
    #[error("store is locked: {}", .0.display())]
    Locked(PathBuf),
}
