//! # Syncline Storage
//!
//! Store adapters for the Syncline client and sync endpoint.
//!
//! Syncline treats every store as an opaque collaborator reached through a
//! trait. This crate defines those traits and ships reference adapters.
//!
//! ## Client side
//!
//! - [`LocalStore`] - rows of one entity type on the device
//!   - [`MemoryLocalStore`] for tests and ephemeral data
//!   - [`SqliteLocalStore`] embedded relational storage
//! - [`KeyValueStore`] - durable string keys, wrapped by [`CursorStore`]
//!   - [`MemoryKvStore`], [`FileKvStore`]
//!
//! ## Server side
//!
//! - [`RemoteStore`] - canonical rows with a secondary index ordered by
//!   `updated_at`, bounded batch writes and continuation-key queries
//!   - [`MemoryRemoteStore`]
//!
//! ## Example
//!
//! ```rust
//! use syncline_storage::{CursorStore, LocalStore, MemoryKvStore, MemoryLocalStore};
//! use syncline_sync_protocol::Todo;
//!
//! let store = MemoryLocalStore::<Todo>::new();
//! store.insert(&Todo::new("a", "milk", 100)).unwrap();
//! assert_eq!(store.dirty_since(Some(50)).unwrap().len(), 1);
//!
//! let cursors = CursorStore::new(MemoryKvStore::new());
//! cursors.save("todos", 1_000).unwrap();
//! assert_eq!(cursors.load("todos").unwrap(), Some(1_000));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod kv;
mod local;
mod memory;
mod remote;
mod remote_memory;
mod sqlite;

pub use error::{StorageError, StorageResult};
pub use file::FileKvStore;
pub use kv::{cursor_key, CursorStore, KeyValueStore, CURSOR_KEY_PREFIX};
pub use local::LocalStore;
pub use memory::{MemoryKvStore, MemoryLocalStore};
pub use remote::{
    BatchWriteOutcome, IndexKey, IndexQuery, QueryPage, RemoteItem, RemoteStore,
    ENTITY_TYPE_ATTRIBUTE, MAX_BATCH_WRITE_ITEMS,
};
pub use remote_memory::MemoryRemoteStore;
pub use sqlite::SqliteLocalStore;
