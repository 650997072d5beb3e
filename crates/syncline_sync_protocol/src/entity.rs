//! Syncable entities.

use crate::clock::Clock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Capability contract for an entity that can be synced.
///
/// Every entity type carries an immutable `id`, a `created_at`, an
/// `updated_at` that is the sole conflict-resolution signal, and an optional
/// `deleted_at` marking a tombstone.
///
/// # Invariants
///
/// - `id` is never reused once assigned
/// - `updated_at` strictly increases on every local mutation
/// - tombstones are retained, never purged by sync
pub trait SyncableEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Entity type name, used as the endpoint path segment and the remote
    /// partition key.
    const ENTITY_TYPE: &'static str;

    /// The merge key.
    fn id(&self) -> &str;

    /// Creation time.
    fn created_at(&self) -> Timestamp;

    /// Last modification time.
    fn updated_at(&self) -> Timestamp;

    /// Deletion time, if this row is a tombstone.
    fn deleted_at(&self) -> Option<Timestamp>;

    /// Sets the last modification time.
    fn set_updated_at(&mut self, ts: Timestamp);

    /// Sets or clears the deletion time.
    fn set_deleted_at(&mut self, ts: Option<Timestamp>);

    /// Returns true if this row is soft-deleted.
    fn is_tombstone(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// Returns true if this row changed after `cursor`.
    ///
    /// With no cursor every row is dirty.
    fn is_dirty_since(&self, cursor: Option<Timestamp>) -> bool {
        match cursor {
            None => true,
            Some(cursor) => {
                self.updated_at() > cursor || self.deleted_at().is_some_and(|d| d > cursor)
            }
        }
    }

    /// Bumps `updated_at` to `now`, or one past its current value when the
    /// clock has not moved forward. Returns the new value.
    fn touch(&mut self, now: Timestamp) -> Timestamp {
        let next = now.max(self.updated_at().saturating_add(1));
        self.set_updated_at(next);
        next
    }

    /// Marks the row deleted. Returns false if it already was.
    fn soft_delete(&mut self, now: Timestamp) -> bool {
        if self.is_tombstone() {
            return false;
        }
        let ts = self.touch(now);
        self.set_deleted_at(Some(ts));
        true
    }
}

/// A todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Globally unique id.
    pub id: String,
    /// Title text.
    pub title: String,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
    /// Deletion time for tombstones.
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

impl Todo {
    /// Builds a todo with explicit id and timestamps.
    pub fn new(id: impl Into<String>, title: impl Into<String>, at: Timestamp) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            completed: false,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    /// Creates a fresh todo with a random id, stamped with the clock's time.
    pub fn create(title: impl Into<String>, clock: &dyn Clock) -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            title,
            clock.now_millis(),
        )
    }

    /// Changes the title.
    pub fn rename(&mut self, title: impl Into<String>, clock: &dyn Clock) {
        self.title = title.into();
        self.touch(clock.now_millis());
    }

    /// Changes the completion flag.
    pub fn set_completed(&mut self, completed: bool, clock: &dyn Clock) {
        self.completed = completed;
        self.touch(clock.now_millis());
    }
}

impl SyncableEntity for Todo {
    const ENTITY_TYPE: &'static str = "todos";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    fn deleted_at(&self) -> Option<Timestamp> {
        self.deleted_at
    }

    fn set_updated_at(&mut self, ts: Timestamp) {
        self.updated_at = ts;
    }

    fn set_deleted_at(&mut self, ts: Option<Timestamp>) {
        self.deleted_at = ts;
    }
}
