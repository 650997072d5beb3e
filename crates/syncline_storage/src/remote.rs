//! Remote store trait definition.
//!
//! The remote store is the canonical copy of every entity, shared by all
//! clients. It is modelled on a partitioned key-value table with one
//! secondary index: rows of an entity type ordered by `(updated_at, id)`.

use crate::error::{StorageError, StorageResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use syncline_sync_protocol::{PageToken, Timestamp};

/// Native item limit of one `batch_write` call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Attribute that tags a stored item with its entity type.
pub const ENTITY_TYPE_ATTRIBUTE: &str = "entityType";

/// One stored row.
///
/// `attributes` holds the full wire object except the entity-type tag.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    /// Partition the row belongs to.
    pub entity_type: String,
    /// Primary key.
    pub id: String,
    /// Secondary index sort key.
    pub updated_at: Timestamp,
    /// Wire attributes, `id` and `updatedAt` included.
    pub attributes: Map<String, Value>,
}

impl RemoteItem {
    /// Builds a stored row from a wire object and tags it with `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidItem` unless `value` is an object with a string `id`
    /// and an integer `updatedAt`.
    pub fn from_wire(entity_type: &str, value: Value) -> StorageResult<Self> {
        let Value::Object(mut attributes) = value else {
            return Err(StorageError::InvalidItem("item is not an object".into()));
        };

        let id = match attributes.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(StorageError::InvalidItem("missing string id".into())),
        };
        let updated_at = attributes
            .get("updatedAt")
            .and_then(Value::as_i64)
            .ok_or_else(|| StorageError::InvalidItem(format!("{id}: missing integer updatedAt")))?;

        // A client cannot move a row into another partition.
        attributes.remove(ENTITY_TYPE_ATTRIBUTE);

        Ok(Self {
            entity_type: entity_type.to_string(),
            id,
            updated_at,
            attributes,
        })
    }

    /// Returns the wire object, without the entity-type tag.
    pub fn into_wire(self) -> Value {
        Value::Object(self.attributes)
    }

    /// Returns this row's position in the secondary index.
    pub fn index_key(&self) -> IndexKey {
        IndexKey {
            updated_at: self.updated_at,
            id: self.id.clone(),
        }
    }
}

/// Position in the secondary index of one partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    /// Sort key.
    pub updated_at: Timestamp,
    /// Tie-breaker.
    pub id: String,
}

impl From<PageToken> for IndexKey {
    fn from(token: PageToken) -> Self {
        Self {
            updated_at: token.updated_at,
            id: token.id,
        }
    }
}

impl From<IndexKey> for PageToken {
    fn from(key: IndexKey) -> Self {
        PageToken::new(key.updated_at, key.id)
    }
}

/// A changed-since query against the secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    /// Partition to read.
    pub entity_type: String,
    /// Lower bound on `updated_at`, exclusive. `None` reads the whole
    /// partition.
    pub updated_after: Option<Timestamp>,
    /// Resume strictly after this key.
    pub exclusive_start_key: Option<IndexKey>,
    /// Maximum items to return. The store may return fewer.
    pub limit: Option<usize>,
}

impl IndexQuery {
    /// Queries `entity_type` for rows updated after `updated_after`.
    pub fn changed_since(entity_type: impl Into<String>, updated_after: Option<Timestamp>) -> Self {
        Self {
            entity_type: entity_type.into(),
            updated_after,
            exclusive_start_key: None,
            limit: None,
        }
    }

    /// Resumes after `key`.
    #[must_use]
    pub fn starting_after(mut self, key: Option<IndexKey>) -> Self {
        self.exclusive_start_key = key;
        self
    }

    /// Caps the page length.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Rows in `(updated_at, id)` order.
    pub items: Vec<RemoteItem>,
    /// Key of the last row returned, or `None` if the query is exhausted.
    pub last_evaluated_key: Option<IndexKey>,
}

/// Result of a batch write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutcome {
    /// Items the store did not write; the caller may resubmit them.
    pub unprocessed: Vec<RemoteItem>,
}

impl BatchWriteOutcome {
    /// Returns true if every item was written.
    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

/// Durable indexed storage for canonical rows.
///
/// # Invariants
///
/// - writes are unconditional overwrites keyed by `id`
/// - `query` returns rows in ascending `(updated_at, id)` order
/// - `last_evaluated_key` is `None` only when no row follows the page
///
/// # Implementors
///
/// - [`super::MemoryRemoteStore`] - For testing
pub trait RemoteStore: Send + Sync {
    /// Writes up to [`MAX_BATCH_WRITE_ITEMS`] rows.
    ///
    /// # Errors
    ///
    /// Returns `BatchTooLarge` for oversize batches. Throttled items are not
    /// an error; they come back in [`BatchWriteOutcome::unprocessed`].
    fn batch_write(&self, items: Vec<RemoteItem>) -> StorageResult<BatchWriteOutcome>;

    /// Reads one page of the secondary index.
    fn query(&self, query: &IndexQuery) -> StorageResult<QueryPage>;
}

impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    fn batch_write(&self, items: Vec<RemoteItem>) -> StorageResult<BatchWriteOutcome> {
        (**self).batch_write(items)
    }

    fn query(&self, query: &IndexQuery) -> StorageResult<QueryPage> {
        (**self).query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_wire_tags_and_into_wire_strips() {
        let item = RemoteItem::from_wire(
            "todos",
            json!({"id": "a", "title": "x", "updatedAt": 5, "entityType": "images"}),
        )
        .unwrap();
        assert_eq!(item.entity_type, "todos");
        assert_eq!(item.id, "a");
        assert_eq!(item.updated_at, 5);

        let wire = item.into_wire();
        assert_eq!(wire, json!({"id": "a", "title": "x", "updatedAt": 5}));
    }

    #[test]
    fn from_wire_rejects_malformed_items() {
        for value in [
            json!(["a"]),
            json!({"updatedAt": 1}),
            json!({"id": 7, "updatedAt": 1}),
            json!({"id": "a"}),
            json!({"id": "a", "updatedAt": "soon"}),
        ] {
            assert!(matches!(
                RemoteItem::from_wire("todos", value),
                Err(StorageError::InvalidItem(_))
            ));
        }
    }

    #[test]
    fn index_key_orders_by_time_then_id() {
        let a = IndexKey { updated_at: 1, id: "z".into() };
        let b = IndexKey { updated_at: 2, id: "a".into() };
        let c = IndexKey { updated_at: 2, id: "b".into() };
        assert!(a < b && b < c);
    }

    #[test]
    fn index_key_converts_to_page_token() {
        let key = IndexKey { updated_at: 9, id: "q".into() };
        let token: PageToken = key.clone().into();
        assert_eq!(IndexKey::from(token), key);
    }
}
