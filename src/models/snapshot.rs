//! Snapshot data model
//!
//! A snapshot is one immutable capture of the installation: the application
//! config file, a compressed database dump, and a compressed archive of the
//! application tree, described by a metadata file that is written last.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StewardError, StewardResult};

/// Format version of `metadata.json`
pub const METADATA_FORMAT_VERSION: u32 = 1;

/// Name of the metadata file inside a snapshot directory
pub const METADATA_FILE: &str = "metadata.json";

/// Subdirectory holding the copied config file
pub const CONFIG_DIR: &str = "config";

/// Subdirectory holding the database dump
pub const DATABASE_DIR: &str = "database";

/// Name of the tree archive inside a snapshot directory
pub const TREE_ARCHIVE: &str = "tree.tar.gz";

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotKind {
    /// Requested by an operator
    Manual,
    /// Taken at the end of a fresh install
    Initial,
    /// Safety snapshot before an update
    PreUpdate,
    /// Safety snapshot before a rollback
    PreRollback,
    /// Last capture before the installation is removed
    FinalPreUninstall,
}

impl SnapshotKind {
    /// All kinds, longest tag first so id suffix matching is unambiguous
    pub const ALL: [SnapshotKind; 5] = [
        SnapshotKind::FinalPreUninstall,
        SnapshotKind::PreRollback,
        SnapshotKind::PreUpdate,
        SnapshotKind::Initial,
        SnapshotKind::Manual,
    ];

    /// The tag used in ids and listings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Initial => "initial",
            Self::PreUpdate => "pre-update",
            Self::PreRollback => "pre-rollback",
            Self::FinalPreUninstall => "final-pre-uninstall",
        }
    }

    /// Whether this snapshot was taken automatically before a destructive step
    pub fn is_safety(&self) -> bool {
        matches!(
            self,
            Self::PreUpdate | Self::PreRollback | Self::FinalPreUninstall
        )
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = StewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StewardError::Config(format!("Unknown snapshot kind: {}", s)))
    }
}

/// Identifier of a snapshot: creation timestamp plus kind tag
///
/// Rendered as `YYYYMMDD-HHMMSS-mmm-<kind>`, optionally followed by `-N`
/// when two snapshots of the same kind land on the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Build the id for a snapshot created at `created_at`
    pub fn generate(created_at: DateTime<Utc>, kind: SnapshotKind) -> Self {
        Self(format!(
            "{}-{:03}-{}",
            created_at.format(TIMESTAMP_FORMAT),
            created_at.timestamp_subsec_millis(),
            kind
        ))
    }

    /// The same id with a collision suffix appended
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}-{}", self.0, n))
    }

    /// Parse and validate an id
    pub fn parse(s: &str) -> StewardResult<Self> {
        parse_id_timestamp(s)
            .map(|_| Self(s.to_string()))
            .ok_or_else(|| StewardError::Config(format!("Malformed snapshot id: {}", s)))
    }

    /// The timestamp encoded in the id
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_id_timestamp(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the working directory used while the snapshot is being written
    pub fn partial_dir_name(&self) -> String {
        format!(".{}.partial", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = StewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse `YYYYMMDD-HHMMSS-mmm-...` into a timestamp
fn parse_id_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let mut parts = s.splitn(4, '-');
    let date = parts.next()?;
    let time = parts.next()?;
    let millis = parts.next()?;
    let rest = parts.next()?;

    if date.len() != 8 || time.len() != 6 || millis.len() != 3 || rest.is_empty() {
        return None;
    }
    if !SnapshotKind::ALL
        .iter()
        .any(|kind| rest == kind.as_str() || rest.starts_with(&format!("{}-", kind.as_str())))
    {
        return None;
    }

    let naive = NaiveDateTime::parse_from_str(&format!("{}-{}", date, time), TIMESTAMP_FORMAT).ok()?;
    let millis: i64 = millis.parse().ok()?;
    let naive = naive + chrono::Duration::milliseconds(millis);
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Content hashes of the three payloads (hex SHA-256)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub config: String,
    pub database: String,
    pub tree: String,
}

/// Payload sizes in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSizes {
    pub config: u64,
    pub database: u64,
    pub tree: u64,
}

impl PayloadSizes {
    pub fn total(&self) -> u64 {
        self.config + self.database + self.tree
    }
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Format version for migration support
    pub format_version: u32,
    pub id: SnapshotId,
    pub kind: SnapshotKind,
    pub created_at: DateTime<Utc>,
    /// Application version installed when the snapshot was taken
    pub source_version: String,
    /// File name of the config copy under `config/`
    pub config_file: String,
    /// File name of the dump under `database/`
    pub database_dump: String,
    pub checksums: Checksums,
    #[serde(default)]
    pub sizes: PayloadSizes,
}

/// A complete snapshot as seen by listings, retention and restore
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub metadata: SnapshotMetadata,
    /// Directory holding the snapshot
    pub path: PathBuf,
    /// Exempt from retention for the duration of a rollback; never persisted
    pub protected: bool,
}

impl SnapshotInfo {
    pub fn id(&self) -> &SnapshotId {
        &self.metadata.id
    }

    pub fn kind(&self) -> SnapshotKind {
        self.metadata.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }

    /// Approximate on-disk size of the payloads
    pub fn size_bytes(&self) -> u64 {
        self.metadata.sizes.total()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_DIR).join(&self.metadata.config_file)
    }

    pub fn database_dump_path(&self) -> PathBuf {
        self.path.join(DATABASE_DIR).join(&self.metadata.database_dump)
    }

    pub fn tree_archive_path(&self) -> PathBuf {
        self.path.join(TREE_ARCHIVE)
    }
}
