//! In-memory stores for testing.

use crate::error::{StorageError, StorageResult};
use crate::kv::KeyValueStore;
use crate::local::LocalStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use syncline_sync_protocol::SyncableEntity;

/// An in-memory local store.
///
/// Rows are kept in id order. Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral replicas that don't need persistence
///
/// # Example
///
/// ```rust
/// use syncline_storage::{LocalStore, MemoryLocalStore};
/// use syncline_sync_protocol::Todo;
///
/// let store = MemoryLocalStore::new();
/// store.insert(&Todo::new("a", "milk", 1)).unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug)]
pub struct MemoryLocalStore<E> {
    rows: RwLock<BTreeMap<String, E>>,
}

impl<E: SyncableEntity> MemoryLocalStore<E> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a store holding `rows`.
    #[must_use]
    pub fn with_rows(rows: impl IntoIterator<Item = E>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| (row.id().to_string(), row))
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Number of rows, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl<E: SyncableEntity> Default for MemoryLocalStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SyncableEntity> LocalStore<E> for MemoryLocalStore<E> {
    fn insert(&self, entity: &E) -> StorageResult<()> {
        let mut rows = self.rows.write();
        if rows.contains_key(entity.id()) {
            return Err(StorageError::DuplicateId(entity.id().to_string()));
        }
        rows.insert(entity.id().to_string(), entity.clone());
        Ok(())
    }

    fn update(&self, entity: &E) -> StorageResult<bool> {
        match self.rows.write().get_mut(entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get(&self, id: &str) -> StorageResult<Option<E>> {
        Ok(self.rows.read().get(id).cloned())
    }

    fn select(&self, predicate: &dyn Fn(&E) -> bool) -> StorageResult<Vec<E>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }
}

/// An in-memory key-value store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
