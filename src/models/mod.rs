//! Core data models for steward
//!
//! Snapshots, the managed installation, its generated config file and the
//! results reported by lifecycle operations.

pub mod app_config;
pub mod installation;
pub mod lifecycle;
pub mod snapshot;

pub use app_config::{AppConfig, DatabaseSection};
pub use installation::{Installation, ReleaseMarker};
pub use lifecycle::{LifecycleResult, Operation};
pub use snapshot::{
    Checksums, PayloadSizes, SnapshotId, SnapshotInfo, SnapshotKind, SnapshotMetadata,
};
