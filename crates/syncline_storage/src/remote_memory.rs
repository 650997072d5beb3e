//! In-memory remote store.

use crate::error::{StorageError, StorageResult};
use crate::remote::{
    BatchWriteOutcome, IndexQuery, QueryPage, RemoteItem, RemoteStore, MAX_BATCH_WRITE_ITEMS,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use syncline_sync_protocol::Timestamp;

/// Default cap on items returned by one query call.
const DEFAULT_PAGE_LIMIT: usize = 1000;

type IndexEntry = (String, Timestamp, String);

#[derive(Debug, Default)]
struct Tables {
    /// Primary table keyed by `(entity_type, id)`.
    rows: HashMap<(String, String), RemoteItem>,
    /// Secondary index keyed by `(entity_type, updated_at, id)`.
    index: BTreeSet<IndexEntry>,
}

/// An in-memory remote store.
///
/// Behaves like a partitioned table with one sorted secondary index:
/// queries return at most `page_limit` rows per call and a continuation key
/// while rows remain. Writes can be throttled to exercise retry paths.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use syncline_storage::{IndexQuery, MemoryRemoteStore, RemoteItem, RemoteStore};
///
/// let store = MemoryRemoteStore::new();
/// let item = RemoteItem::from_wire("todos", json!({"id": "a", "updatedAt": 5})).unwrap();
/// store.batch_write(vec![item]).unwrap();
///
/// let page = store.query(&IndexQuery::changed_since("todos", Some(1))).unwrap();
/// assert_eq!(page.items.len(), 1);
/// assert!(page.last_evaluated_key.is_none());
/// ```
#[derive(Debug)]
pub struct MemoryRemoteStore {
    tables: RwLock<Tables>,
    page_limit: usize,
    throttled: AtomicUsize,
    batch_writes: AtomicUsize,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            page_limit: DEFAULT_PAGE_LIMIT,
            throttled: AtomicUsize::new(0),
            batch_writes: AtomicUsize::new(0),
        }
    }

    /// Caps the rows one query call returns.
    #[must_use]
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Reports the next `items` item-writes as unprocessed.
    pub fn throttle_writes(&self, items: usize) {
        self.throttled.store(items, Ordering::SeqCst);
    }

    /// Number of `batch_write` calls served so far.
    pub fn batch_write_calls(&self) -> usize {
        self.batch_writes.load(Ordering::SeqCst)
    }

    /// Number of stored rows across all entity types.
    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    /// Returns true if no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a row.
    pub fn get(&self, entity_type: &str, id: &str) -> Option<RemoteItem> {
        self.tables
            .read()
            .rows
            .get(&(entity_type.to_string(), id.to_string()))
            .cloned()
    }

    fn take_throttle(&self) -> bool {
        self.throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn batch_write(&self, items: Vec<RemoteItem>) -> StorageResult<BatchWriteOutcome> {
        if items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StorageError::BatchTooLarge {
                len: items.len(),
                max: MAX_BATCH_WRITE_ITEMS,
            });
        }
        self.batch_writes.fetch_add(1, Ordering::SeqCst);

        let mut outcome = BatchWriteOutcome::default();
        let mut tables = self.tables.write();
        for item in items {
            if self.take_throttle() {
                outcome.unprocessed.push(item);
                continue;
            }

            let key = (item.entity_type.clone(), item.id.clone());
            if let Some(old) = tables.rows.get(&key) {
                let stale = (old.entity_type.clone(), old.updated_at, old.id.clone());
                tables.index.remove(&stale);
            }
            tables
                .index
                .insert((item.entity_type.clone(), item.updated_at, item.id.clone()));
            tables.rows.insert(key, item);
        }
        Ok(outcome)
    }

    fn query(&self, query: &IndexQuery) -> StorageResult<QueryPage> {
        let entity_type = &query.entity_type;
        let floor = query
            .updated_after
            .map_or(Timestamp::MIN, |ts| ts.saturating_add(1));

        let lower = match &query.exclusive_start_key {
            Some(key) if key.updated_at >= floor => {
                Bound::Excluded((entity_type.clone(), key.updated_at, key.id.clone()))
            }
            _ => Bound::Included((entity_type.clone(), floor, String::new())),
        };

        let limit = query
            .limit
            .unwrap_or(self.page_limit)
            .min(self.page_limit)
            .max(1);

        let tables = self.tables.read();
        let mut keys = tables
            .index
            .range((lower, Bound::Unbounded))
            .take_while(|(et, _, _)| et == entity_type);

        let mut items = Vec::with_capacity(limit);
        for (et, _, id) in keys.by_ref().take(limit) {
            if let Some(row) = tables.rows.get(&(et.clone(), id.clone())) {
                items.push(row.clone());
            }
        }

        let last_evaluated_key = if keys.next().is_some() {
            items.last().map(RemoteItem::index_key)
        } else {
            None
        };

        Ok(QueryPage {
            items,
            last_evaluated_key,
        })
    }
}
