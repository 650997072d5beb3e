//! Applies pulled rows to a local store.

use crate::error::SyncResult;
use std::marker::PhantomData;
use syncline_storage::LocalStore;
use syncline_sync_protocol::{decide, MergeDecision, SyncableEntity, TieBreak};

/// Counts from applying one page of pulled rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Live rows received and merged.
    pub pulled: u64,
    /// Tombstones that changed a local row.
    pub tombstones_applied: u64,
    /// Tombstones skipped because tombstone pull is off.
    pub tombstones_skipped: u64,
    /// Local rows inserted or rewritten.
    pub written: u64,
}

impl MergeReport {
    /// Adds another report's counts to this one.
    pub fn absorb(&mut self, other: MergeReport) {
        self.pulled += other.pulled;
        self.tombstones_applied += other.tombstones_applied;
        self.tombstones_skipped += other.tombstones_skipped;
        self.written += other.written;
    }
}

/// Merges remote rows into a [`LocalStore`] with the last-write-wins rule.
///
/// # Invariants
///
/// - applying the same rows twice leaves the store as after the first pass
/// - a tombstone pulled onto an existing row only sets its `deleted_at`
/// - with tombstone pull off, pulled tombstones never touch the store
pub struct LocalApplier<'a, E, L> {
    store: &'a L,
    tie_break: TieBreak,
    pull_tombstones: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: SyncableEntity, L: LocalStore<E>> LocalApplier<'a, E, L> {
    /// Creates an applier writing into `store`.
    pub fn new(store: &'a L) -> Self {
        Self {
            store,
            tie_break: TieBreak::default(),
            pull_tombstones: false,
            _entity: PhantomData,
        }
    }

    /// Sets the tie-break policy.
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Enables merging of pulled tombstones.
    pub fn with_tombstone_pull(mut self, enabled: bool) -> Self {
        self.pull_tombstones = enabled;
        self
    }

    /// Applies one page of remote rows.
    pub fn apply(&self, rows: &[E]) -> SyncResult<MergeReport> {
        let mut report = MergeReport::default();

        for remote in rows {
            let tombstone = remote.is_tombstone();
            if tombstone && !self.pull_tombstones {
                report.tombstones_skipped += 1;
                continue;
            }

            let local = self.store.get(remote.id())?;
            let decision = decide(local.as_ref(), remote, self.tie_break);
            let wrote = match decision {
                MergeDecision::Insert => {
                    self.store.insert(remote)?;
                    true
                }
                MergeDecision::Overwrite => self.store.update(remote)?,
                MergeDecision::ApplyTombstone => match local {
                    // Already deleted at the same instant.
                    Some(row) if row.deleted_at() == remote.deleted_at() => false,
                    Some(mut row) => {
                        row.set_deleted_at(remote.deleted_at());
                        self.store.update(&row)?
                    }
                    None => false,
                },
                MergeDecision::KeepLocal => false,
            };

            if wrote {
                report.written += 1;
            }
            if !tombstone {
                report.pulled += 1;
            } else if wrote {
                report.tombstones_applied += 1;
            }
        }

        Ok(report)
    }
}
