//! Snapshot backup and restore for steward
//!
//! # Architecture
//!
//! - `SnapshotStore`: the directory of snapshots; listing, lookup, deletion,
//!   integrity checks and cleanup of abandoned working directories
//! - `RetentionPolicy`: which snapshots survive a new one
//! - `BackupManager`: captures config, database and tree into a snapshot
//! - `RestoreEngine`: rebuilds the live installation from a snapshot
//!
//! # Snapshot layout
//!
//! ```text
//! <snapshot-root>/<id>/
//!   metadata.json      # written last; its presence marks the snapshot complete
//!   config/<file>
//!   database/<db>.sql.gz
//!   tree.tar.gz        # derived subtrees (virtualenv, static assets) excluded
//! ```

pub mod archive;
mod manager;
mod restore;
mod retention;
mod store;

pub use archive::Exclusions;
pub use manager::{dump_file_name, BackupManager, SnapshotOutcome};
pub use restore::{Healthy, RestoreEngine, RestoreFailure, RestoreStep};
pub use retention::{RetentionPlan, RetentionPolicy};
pub use store::{verify_snapshot, SnapshotStore, VerifyReport, LATEST};
