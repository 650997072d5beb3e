//! Batched upsert into the remote store.

use syncline_storage::{
    RemoteItem, RemoteStore, StorageError, StorageResult, MAX_BATCH_WRITE_ITEMS,
};
use tracing::{debug, warn};

/// Result of upserting one request's items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Items written.
    pub written: u64,
    /// Ids still unwritten after the retry budget ran out.
    pub unprocessed: Vec<String>,
    /// `batch_write` calls issued, retries included.
    pub write_calls: u64,
}

/// Writes `items` in batches of at most `batch_limit`.
///
/// When a batch comes back with unprocessed items, only that subset is
/// resubmitted, up to `max_retries` times with no backoff. Items still
/// unprocessed after the last attempt are reported by id.
pub fn upsert_items<R: RemoteStore + ?Sized>(
    store: &R,
    items: Vec<RemoteItem>,
    batch_limit: usize,
    max_retries: u32,
) -> StorageResult<UpsertOutcome> {
    let batch_limit = batch_limit.clamp(1, MAX_BATCH_WRITE_ITEMS);
    let mut outcome = UpsertOutcome::default();
    let mut items = items.into_iter().peekable();
    let mut batch_no = 0usize;

    while items.peek().is_some() {
        let batch: Vec<RemoteItem> = items.by_ref().take(batch_limit).collect();
        let submitted = batch.len();

        let mut pending = store.batch_write(batch)?.unprocessed;
        outcome.write_calls += 1;

        let mut attempts = 0;
        while !pending.is_empty() && attempts < max_retries {
            debug!(
                batch = batch_no,
                attempt = attempts + 1,
                pending = pending.len(),
                "retrying unprocessed items"
            );
            pending = store.batch_write(pending)?.unprocessed;
            outcome.write_calls += 1;
            attempts += 1;
        }

        let written = submitted.checked_sub(pending.len()).ok_or_else(|| {
            StorageError::Corrupted(format!(
                "store reported {} unprocessed items for a batch of {submitted}",
                pending.len()
            ))
        })?;
        outcome.written += written as u64;
        if !pending.is_empty() {
            warn!(
                batch = batch_no,
                dropped = pending.len(),
                retries = attempts,
                "items left unprocessed after retries"
            );
            outcome
                .unprocessed
                .extend(pending.into_iter().map(|item| item.id));
        }
        batch_no += 1;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncline_storage::{BatchWriteOutcome, IndexQuery, MemoryRemoteStore, QueryPage};

    fn items(n: usize) -> Vec<RemoteItem> {
        (0..n)
            .map(|i| {
                RemoteItem::from_wire("todos", json!({"id": format!("t{i:03}"), "updatedAt": i}))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn writes_in_chunks_of_limit() {
        let store = MemoryRemoteStore::new();
        let outcome = upsert_items(&store, items(60), 25, 5).unwrap();
        assert_eq!(outcome.written, 60);
        assert_eq!(outcome.write_calls, 3);
        assert!(outcome.unprocessed.is_empty());
        assert_eq!(store.len(), 60);
    }

    #[test]
    fn retries_only_unprocessed_subset() {
        let store = MemoryRemoteStore::new();
        store.throttle_writes(3);
        let outcome = upsert_items(&store, items(10), 25, 5).unwrap();

        // First call leaves 3, the retry leaves none.
        assert_eq!(outcome.write_calls, 2);
        assert_eq!(outcome.written, 10);
        assert!(outcome.unprocessed.is_empty());
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let store = MemoryRemoteStore::new();
        store.throttle_writes(usize::MAX);
        let outcome = upsert_items(&store, items(3), 25, 5).unwrap();

        assert_eq!(outcome.write_calls, 6);
        assert_eq!(outcome.written, 0);
        assert_eq!(outcome.unprocessed, vec!["t000", "t001", "t002"]);
        assert!(store.is_empty());
    }

    #[test]
    fn leftovers_are_excluded_from_written() {
        let store = MemoryRemoteStore::new();
        // Batch 0 loses 25, then 25, then 20 of its items; batch 1 is clean.
        store.throttle_writes(70);
        let outcome = upsert_items(&store, items(30), 25, 2).unwrap();

        assert_eq!(outcome.write_calls, 4);
        assert_eq!(outcome.written, 10);
        let expected: Vec<String> = (0..20).map(|i| format!("t{i:03}")).collect();
        assert_eq!(outcome.unprocessed, expected);
        assert_eq!(store.len(), 10);
    }

    #[test]
    fn empty_input_issues_no_writes() {
        let store = MemoryRemoteStore::new();
        let outcome = upsert_items(&store, vec![], 25, 5).unwrap();
        assert_eq!(outcome, UpsertOutcome::default());
        assert_eq!(store.batch_write_calls(), 0);
    }

    struct DuplicatingStore;

    impl RemoteStore for DuplicatingStore {
        fn batch_write(&self, items: Vec<RemoteItem>) -> StorageResult<BatchWriteOutcome> {
            let mut unprocessed = items.clone();
            unprocessed.extend(items);
            Ok(BatchWriteOutcome { unprocessed })
        }

        fn query(&self, _query: &IndexQuery) -> StorageResult<QueryPage> {
            Ok(QueryPage::default())
        }
    }

    #[test]
    fn inflated_unprocessed_report_is_corruption() {
        let err = upsert_items(&DuplicatingStore, items(3), 25, 0).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }
}
