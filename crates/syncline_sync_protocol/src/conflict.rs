//! Last-write-wins merge rule.

use crate::entity::SyncableEntity;

/// How to settle a pulled row whose `updated_at` equals the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Take the remote copy. The server holds the last physical write, so
    /// every replica converges on it.
    #[default]
    PreferRemote,
    /// Keep the local copy.
    PreferLocal,
}

/// What to do with one pulled row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No local row exists; insert the remote row verbatim.
    Insert,
    /// Replace the local row with the remote one.
    Overwrite,
    /// Copy only the remote `deleted_at` onto the local row.
    ApplyTombstone,
    /// Leave the local row as it is.
    KeepLocal,
}

impl MergeDecision {
    /// Returns true if the local store must be written.
    pub fn writes(&self) -> bool {
        !matches!(self, MergeDecision::KeepLocal)
    }
}

/// Decides how a pulled `remote` row merges with the local row of the same id.
///
/// The greater `updated_at` wins. Ties follow `tie`, except that a live
/// remote row never replaces a local tombstone on a tie.
pub fn decide<E: SyncableEntity>(local: Option<&E>, remote: &E, tie: TieBreak) -> MergeDecision {
    let Some(local) = local else {
        return MergeDecision::Insert;
    };

    let remote_wins = match remote.updated_at().cmp(&local.updated_at()) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => match tie {
            TieBreak::PreferLocal => false,
            TieBreak::PreferRemote => !(local.is_tombstone() && !remote.is_tombstone()),
        },
    };

    if !remote_wins {
        MergeDecision::KeepLocal
    } else if remote.is_tombstone() {
        MergeDecision::ApplyTombstone
    } else {
        MergeDecision::Overwrite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Todo;

    fn todo(updated_at: i64, title: &str) -> Todo {
        let mut t = Todo::new("a", title, 1);
        t.updated_at = updated_at;
        t
    }

    #[test]
    fn missing_local_inserts() {
        let remote = todo(200, "y");
        assert_eq!(
            decide(None, &remote, TieBreak::default()),
            MergeDecision::Insert
        );
    }

    #[test]
    fn newer_remote_overwrites() {
        let local = todo(100, "x");
        let remote = todo(200, "y");
        assert_eq!(
            decide(Some(&local), &remote, TieBreak::PreferLocal),
            MergeDecision::Overwrite
        );
    }

    #[test]
    fn older_remote_is_ignored() {
        let local = todo(200, "x");
        let remote = todo(100, "y");
        assert_eq!(
            decide(Some(&local), &remote, TieBreak::PreferRemote),
            MergeDecision::KeepLocal
        );
    }

    #[test]
    fn tie_follows_policy() {
        let local = todo(100, "x");
        let remote = todo(100, "y");
        assert_eq!(
            decide(Some(&local), &remote, TieBreak::PreferRemote),
            MergeDecision::Overwrite
        );
        assert_eq!(
            decide(Some(&local), &remote, TieBreak::PreferLocal),
            MergeDecision::KeepLocal
        );
    }

    #[test]
    fn tie_never_revives_local_tombstone() {
        let mut local = todo(100, "x");
        local.deleted_at = Some(100);
        let remote = todo(100, "x");
        assert_eq!(
            decide(Some(&local), &remote, TieBreak::PreferRemote),
            MergeDecision::KeepLocal
        );
    }

    #[test]
    fn newer_remote_tombstone_applies_only_deletion() {
        let local = todo(100, "x");
        let mut remote = todo(300, "y");
        remote.deleted_at = Some(300);
        let decision = decide(Some(&local), &remote, TieBreak::default());
        assert_eq!(decision, MergeDecision::ApplyTombstone);
        assert!(decision.writes());
        assert!(!MergeDecision::KeepLocal.writes());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn greater_stamp_always_wins(
            local_ts in 0i64..1_000,
            remote_ts in 0i64..1_000,
            prefer_local in any::<bool>(),
            remote_deleted in any::<bool>(),
        ) {
            let local = todo(local_ts, "x");
            let mut remote = todo(remote_ts, "y");
            if remote_deleted {
                remote.deleted_at = Some(remote_ts);
            }
            let tie = if prefer_local { TieBreak::PreferLocal } else { TieBreak::PreferRemote };

            let decision = decide(Some(&local), &remote, tie);
            if remote_ts < local_ts {
                prop_assert_eq!(decision, MergeDecision::KeepLocal);
            } else if remote_ts > local_ts {
                prop_assert!(decision.writes());
                prop_assert_eq!(decision == MergeDecision::ApplyTombstone, remote_deleted);
            }
        }
    }
}

