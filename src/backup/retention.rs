//! Snapshot retention
//!
//! Keeps the newest `keep_count` complete snapshots and deletes the rest. A
//! protected snapshot (the source of an in-flight rollback) takes no part in
//! the decision: it neither uses up a slot nor can be deleted.

use tracing::{info, warn};

use super::store::SnapshotStore;
use crate::config::settings::RetentionSettings;
use crate::error::StewardResult;
use crate::models::{SnapshotId, SnapshotInfo};

/// Which snapshots survive and which go
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Survivors, newest first; includes the protected id if it exists
    pub keep: Vec<SnapshotId>,
    /// Snapshots to delete, newest first
    pub delete: Vec<SnapshotId>,
}

/// Count-based retention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Snapshots to keep; 0 keeps everything
    pub keep_count: u32,
}

impl RetentionPolicy {
    pub fn new(keep_count: u32) -> Self {
        Self { keep_count }
    }

    pub fn is_unlimited(&self) -> bool {
        self.keep_count == 0
    }

    /// Decide retention over a ledger of complete snapshots
    ///
    /// The ledger may come in any order; it is sorted newest first here.
    pub fn plan(&self, ledger: &[SnapshotInfo], protected: Option<&SnapshotId>) -> RetentionPlan {
        let mut ordered: Vec<&SnapshotInfo> = ledger.iter().collect();
        ordered.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });

        let is_protected = |info: &SnapshotInfo| protected == Some(info.id());
        let protected_present = ordered.iter().any(|info| is_protected(info));
        let candidates: Vec<&SnapshotInfo> =
            ordered.iter().copied().filter(|info| !is_protected(info)).collect();

        let limit = if self.is_unlimited() {
            candidates.len()
        } else {
            self.keep_count as usize
        };

        let mut plan = RetentionPlan::default();
        for (position, info) in candidates.iter().enumerate() {
            if position < limit {
                plan.keep.push(info.id().clone());
            } else {
                plan.delete.push(info.id().clone());
            }
        }

        // shown with the survivors, never counted against the limit
        if let (true, Some(id)) = (protected_present, protected) {
            plan.keep.push(id.clone());
        }
        plan
    }

    /// Apply the policy to the store, returning the ids deleted
    pub fn enforce(
        &self,
        store: &SnapshotStore,
        protected: Option<&SnapshotId>,
    ) -> StewardResult<Vec<SnapshotId>> {
        if self.is_unlimited() {
            return Ok(Vec::new());
        }

        let plan = self.plan(&store.list()?, protected);
        if let Some(id) = protected {
            info!(snapshot = %id, "Snapshot protected from retention");
        }

        let mut deleted = Vec::new();
        for id in plan.delete {
            if protected == Some(&id) {
                warn!(snapshot = %id, "Refusing to delete protected snapshot");
                continue;
            }
            store.delete(&id)?;
            info!(snapshot = %id, keep = self.keep_count, "Pruned by retention");
            deleted.push(id);
        }
        Ok(deleted)
    }
}

impl From<&RetentionSettings> for RetentionPolicy {
    fn from(settings: &RetentionSettings) -> Self {
        Self::new(settings.keep_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SnapshotKind;
    use crate::testing::{minute, seed_snapshot};
    use tempfile::TempDir;

    fn store() -> (SnapshotStore, TempDir) {
        let temp = TempDir::new().unwrap();
        (SnapshotStore::new(temp.path().join("snapshots")), temp)
    }

    fn remaining(store: &SnapshotStore) -> Vec<SnapshotId> {
        store.list().unwrap().iter().map(|s| s.id().clone()).collect()
    }

    #[test]
    fn test_oldest_is_pruned_first() {
        let (store, _temp) = store();
        let initial = seed_snapshot(&store, minute(1), SnapshotKind::Initial);
        let manual = seed_snapshot(&store, minute(2), SnapshotKind::Manual);
        let pre_update = seed_snapshot(&store, minute(3), SnapshotKind::PreUpdate);

        let deleted = RetentionPolicy::new(2).enforce(&store, None).unwrap();

        assert_eq!(deleted, vec![initial]);
        assert_eq!(remaining(&store), vec![pre_update, manual]);
    }

    #[test]
    fn test_zero_keeps_everything() {
        let (store, _temp) = store();
        for m in 0..4 {
            seed_snapshot(&store, minute(m), SnapshotKind::Manual);
        }
        assert!(RetentionPolicy::new(0).enforce(&store, None).unwrap().is_empty());
        assert_eq!(remaining(&store).len(), 4);
    }

    #[test]
    fn test_leaves_min_of_limit_and_total() {
        for total in 0..6u32 {
            for keep in 1..5u32 {
                let (store, _temp) = store();
                let ids: Vec<_> = (0..total)
                    .map(|m| seed_snapshot(&store, minute(m), SnapshotKind::Manual))
                    .collect();

                RetentionPolicy::new(keep).enforce(&store, None).unwrap();

                let left = remaining(&store);
                assert_eq!(left.len(), total.min(keep) as usize);
                let newest: Vec<_> = ids.iter().rev().take(keep as usize).cloned().collect();
                assert_eq!(left, newest);
            }
        }
    }

    #[test]
    fn test_protected_is_never_deleted() {
        for protected_index in 0..5usize {
            let (store, _temp) = store();
            let ids: Vec<_> = (0..5)
                .map(|m| seed_snapshot(&store, minute(m), SnapshotKind::Manual))
                .collect();
            let protected = ids[protected_index].clone();

            let deleted = RetentionPolicy::new(1)
                .enforce(&store, Some(&protected))
                .unwrap();

            assert!(!deleted.contains(&protected));
            let left = remaining(&store);
            assert!(left.contains(&protected));
            // protected plus the newest unprotected one
            assert_eq!(left.len(), 2);
            let newest_unprotected = ids.iter().rev().find(|id| **id != protected).unwrap();
            assert!(left.contains(newest_unprotected));
        }
    }

    #[test]
    fn test_plan_lists_protected_as_kept() {
        let (store, _temp) = store();
        let oldest = seed_snapshot(&store, minute(1), SnapshotKind::PreUpdate);
        let middle = seed_snapshot(&store, minute(2), SnapshotKind::Manual);
        let newest = seed_snapshot(&store, minute(3), SnapshotKind::PreRollback);

        let plan = RetentionPolicy::new(1).plan(&store.list().unwrap(), Some(&oldest));
        assert_eq!(plan.keep, vec![newest, oldest]);
        assert_eq!(plan.delete, vec![middle]);
    }

    #[test]
    fn test_plan_ignores_unknown_protected_id() {
        let (store, _temp) = store();
        let a = seed_snapshot(&store, minute(1), SnapshotKind::Manual);
        let b = seed_snapshot(&store, minute(2), SnapshotKind::Manual);
        let ghost = SnapshotId::parse("20200101-000000-000-manual").unwrap();

        let plan = RetentionPolicy::new(1).plan(&store.list().unwrap(), Some(&ghost));
        assert_eq!(plan.keep, vec![b]);
        assert_eq!(plan.delete, vec![a]);
    }
}
