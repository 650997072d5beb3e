//! Key-value stores and the per-entity-type sync cursor.

use crate::error::{StorageError, StorageResult};
use std::sync::Arc;
use syncline_sync_protocol::Timestamp;
use tracing::warn;

/// Prefix of the cursor key; the full key is `lastSyncTimestamp:{entityType}`.
pub const CURSOR_KEY_PREFIX: &str = "lastSyncTimestamp:";

/// Returns the cursor key for an entity type.
pub fn cursor_key(entity_type: &str) -> String {
    format!("{CURSOR_KEY_PREFIX}{entity_type}")
}

/// Durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a value. Durable once this returns.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for &K {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

impl<K: KeyValueStore + ?Sized> KeyValueStore for Arc<K> {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

/// Per-entity-type sync watermark kept in a [`KeyValueStore`].
///
/// Values are stringified epoch-millisecond integers. The cursor only moves
/// forward: saving a value lower than the stored one keeps the stored one.
#[derive(Debug)]
pub struct CursorStore<K> {
    kv: K,
}

impl<K: KeyValueStore> CursorStore<K> {
    /// Wraps a key-value store.
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Returns the underlying key-value store.
    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Reads the cursor; `None` before the first completed sync.
    pub fn load(&self, entity_type: &str) -> StorageResult<Option<Timestamp>> {
        let key = cursor_key(entity_type);
        match self.kv.get(&key)? {
            None => Ok(None),
            Some(value) => value.trim().parse::<Timestamp>().map(Some).map_err(|_| {
                StorageError::Corrupted(format!("cursor {key} holds non-integer {value:?}"))
            }),
        }
    }

    /// Persists the cursor and returns the value now stored.
    pub fn save(&self, entity_type: &str, cursor: Timestamp) -> StorageResult<Timestamp> {
        if let Some(current) = self.load(entity_type)? {
            if cursor < current {
                warn!(
                    entity_type,
                    current, rejected = cursor, "cursor would move backwards, keeping current"
                );
                return Ok(current);
            }
        }
        self.kv.set(&cursor_key(entity_type), &cursor.to_string())?;
        Ok(cursor)
    }

    /// Forgets the cursor so the next sync is a first sync.
    pub fn clear(&self, entity_type: &str) -> StorageResult<()> {
        self.kv.remove(&cursor_key(entity_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKvStore;

    #[test]
    fn cursor_key_format() {
        assert_eq!(cursor_key("todos"), "lastSyncTimestamp:todos");
    }

    #[test]
    fn cursor_absent_until_saved() {
        let cursors = CursorStore::new(MemoryKvStore::new());
        assert_eq!(cursors.load("todos").unwrap(), None);
        assert_eq!(cursors.save("todos", 1_234).unwrap(), 1_234);
        assert_eq!(cursors.load("todos").unwrap(), Some(1_234));
        assert_eq!(
            cursors.kv().get("lastSyncTimestamp:todos").unwrap().as_deref(),
            Some("1234")
        );
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let cursors = CursorStore::new(MemoryKvStore::new());
        cursors.save("todos", 500).unwrap();
        assert_eq!(cursors.save("todos", 400).unwrap(), 500);
        assert_eq!(cursors.load("todos").unwrap(), Some(500));
        assert_eq!(cursors.save("todos", 600).unwrap(), 600);
    }

    #[test]
    fn cursors_are_per_entity_type() {
        let cursors = CursorStore::new(MemoryKvStore::new());
        cursors.save("todos", 10).unwrap();
        cursors.save("images", 20).unwrap();
        cursors.clear("todos").unwrap();
        assert_eq!(cursors.load("todos").unwrap(), None);
        assert_eq!(cursors.load("images").unwrap(), Some(20));
    }

    #[test]
    fn non_integer_cursor_is_corruption() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set("lastSyncTimestamp:todos", "yesterday").unwrap();
        let cursors = CursorStore::new(Arc::clone(&kv));
        assert!(matches!(
            cursors.load("todos"),
            Err(StorageError::Corrupted(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn saved_cursor_is_running_max(
            values in proptest::collection::vec(proptest::prelude::any::<i64>(), 1..50)
        ) {
            let cursors = CursorStore::new(MemoryKvStore::new());
            let mut max = i64::MIN;
            for value in values {
                max = max.max(value);
                proptest::prop_assert_eq!(cursors.save("todos", value).unwrap(), max);
            }
            proptest::prop_assert_eq!(cursors.load("todos").unwrap(), Some(max));
        }
    }
}
