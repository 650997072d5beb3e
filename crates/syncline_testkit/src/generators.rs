//! Property-based test generators using proptest.
//!
//! Provides strategies for generating todo rows that keep the entity
//! invariants: `created_at <= updated_at`, and a tombstone's `deleted_at`
//! equals its `updated_at`.

use proptest::prelude::*;
use std::collections::BTreeMap;
use syncline_sync_protocol::{Timestamp, Todo};

/// Strategy for generating row ids.
pub fn todo_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating timestamps in `1..=max`.
pub fn timestamp_strategy(max: Timestamp) -> impl Strategy<Value = Timestamp> {
    1..=max.max(1)
}

/// Strategy for generating one todo with the given id.
pub fn todo_with_id_strategy(id: String, max_ts: Timestamp) -> impl Strategy<Value = Todo> {
    (
        "[ -~]{0,24}",
        any::<bool>(),
        timestamp_strategy(max_ts),
        timestamp_strategy(max_ts),
        any::<bool>(),
    )
        .prop_map(move |(title, completed, a, b, deleted)| Todo {
            id: id.clone(),
            title,
            completed,
            created_at: a.min(b),
            updated_at: a.max(b),
            deleted_at: deleted.then_some(a.max(b)),
        })
}

/// Strategy for generating one todo.
pub fn todo_strategy(max_ts: Timestamp) -> impl Strategy<Value = Todo> {
    todo_id_strategy().prop_flat_map(move |id| todo_with_id_strategy(id, max_ts))
}

/// Strategy for generating up to `max_rows` todos with distinct ids.
pub fn todo_rows_strategy(max_rows: usize, max_ts: Timestamp) -> impl Strategy<Value = Vec<Todo>> {
    prop::collection::btree_set(todo_id_strategy(), 0..=max_rows).prop_flat_map(move |ids| {
        ids.into_iter()
            .map(|id| todo_with_id_strategy(id, max_ts))
            .collect::<Vec<_>>()
    })
}

/// Strategy for generating a local and a remote version of the same rows.
///
/// Both sides share ids; each side's copy has independent content and
/// timestamps, so every merge outcome is reachable.
pub fn replica_pair_strategy(
    max_rows: usize,
    max_ts: Timestamp,
) -> impl Strategy<Value = (Vec<Todo>, Vec<Todo>)> {
    prop::collection::btree_set(todo_id_strategy(), 0..=max_rows).prop_flat_map(move |ids| {
        let local: Vec<_> = ids
            .iter()
            .map(|id| prop::option::of(todo_with_id_strategy(id.clone(), max_ts)))
            .collect();
        let remote: Vec<_> = ids
            .into_iter()
            .map(|id| todo_with_id_strategy(id, max_ts))
            .collect();
        (local, remote).prop_map(|(local, remote)| (local.into_iter().flatten().collect(), remote))
    })
}

/// Indexes rows by id.
pub fn by_id(rows: &[Todo]) -> BTreeMap<String, Todo> {
    rows.iter().map(|t| (t.id.clone(), t.clone())).collect()
}
