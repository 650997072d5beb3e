//! Local store trait definition.

use crate::error::StorageResult;
use std::sync::Arc;
use syncline_sync_protocol::{SyncableEntity, Timestamp};

/// Rows of one entity type held on the device.
///
/// Implementations are internally synchronized; every method takes `&self`.
///
/// # Invariants
///
/// - `id` is unique: `insert` of an existing id fails with
///   [`StorageError::DuplicateId`](crate::StorageError::DuplicateId)
/// - rows are never physically removed through this trait
///
/// # Implementors
///
/// - [`super::MemoryLocalStore`] - For testing
/// - [`super::SqliteLocalStore`] - Embedded relational storage
pub trait LocalStore<E: SyncableEntity>: Send + Sync {
    /// Inserts a new row.
    fn insert(&self, entity: &E) -> StorageResult<()>;

    /// Replaces the row with the same id. Returns false if no such row exists.
    fn update(&self, entity: &E) -> StorageResult<bool>;

    /// Looks up a row by id.
    fn get(&self, id: &str) -> StorageResult<Option<E>>;

    /// Returns every row matching `predicate`.
    fn select(&self, predicate: &dyn Fn(&E) -> bool) -> StorageResult<Vec<E>>;

    /// Returns every row, tombstones included.
    fn all(&self) -> StorageResult<Vec<E>> {
        self.select(&|_| true)
    }

    /// Returns rows changed or deleted after `cursor`; all rows when `None`.
    fn dirty_since(&self, cursor: Option<Timestamp>) -> StorageResult<Vec<E>> {
        self.select(&|e| e.is_dirty_since(cursor))
    }

    /// Returns rows that are not tombstones.
    fn active(&self) -> StorageResult<Vec<E>> {
        self.select(&|e| !e.is_tombstone())
    }

    /// Updates the row if present, inserts it otherwise.
    fn upsert(&self, entity: &E) -> StorageResult<()> {
        if !self.update(entity)? {
            self.insert(entity)?;
        }
        Ok(())
    }
}

impl<E: SyncableEntity, S: LocalStore<E> + ?Sized> LocalStore<E> for Arc<S> {
    fn insert(&self, entity: &E) -> StorageResult<()> {
        (**self).insert(entity)
    }

    fn update(&self, entity: &E) -> StorageResult<bool> {
        (**self).update(entity)
    }

    fn get(&self, id: &str) -> StorageResult<Option<E>> {
        (**self).get(id)
    }

    fn select(&self, predicate: &dyn Fn(&E) -> bool) -> StorageResult<Vec<E>> {
        (**self).select(predicate)
    }

    fn all(&self) -> StorageResult<Vec<E>> {
        (**self).all()
    }

    fn dirty_since(&self, cursor: Option<Timestamp>) -> StorageResult<Vec<E>> {
        (**self).dirty_since(cursor)
    }

    fn active(&self) -> StorageResult<Vec<E>> {
        (**self).active()
    }
}
