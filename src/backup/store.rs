//! The on-disk snapshot collection
//!
//! Complete snapshots live at `<root>/<id>/` and always carry a metadata file.
//! Snapshots still being written live at `<root>/.<id>.partial/` and are never
//! returned by `list`, `get` or `latest`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::archive::sha256_file;
use crate::error::{StewardError, StewardResult};
use crate::models::snapshot::METADATA_FILE;
use crate::models::{SnapshotId, SnapshotInfo, SnapshotKind, SnapshotMetadata};
use crate::storage::file_io::read_json_required;

/// Reference that resolves to the newest complete snapshot
pub const LATEST: &str = "latest";

const PARTIAL_SUFFIX: &str = ".partial";

/// Outcome of re-hashing a snapshot's payloads
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub id: SnapshotId,
    /// One entry per payload that is missing or does not match its checksum
    pub problems: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Directory of snapshots for the installation
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the snapshot root if needed
    pub fn ensure_root(&self) -> StewardResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            StewardError::Io(format!(
                "Failed to create snapshot directory {}: {}",
                self.root.display(),
                e
            ))
        })?;
        fs::set_permissions(&self.root, fs::Permissions::from_mode(0o751))?;
        Ok(())
    }

    /// Final location of a snapshot
    pub fn snapshot_path(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Working location of a snapshot being written
    pub fn partial_path(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(id.partial_dir_name())
    }

    /// Pick an id for a new snapshot that collides with nothing on disk
    pub fn allocate_id(&self, created_at: DateTime<Utc>, kind: SnapshotKind) -> SnapshotId {
        let base = SnapshotId::generate(created_at, kind);
        let taken = |id: &SnapshotId| self.snapshot_path(id).exists() || self.partial_path(id).exists();
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = base.with_suffix(n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// All complete snapshots, newest first
    pub fn list(&self) -> StewardResult<Vec<SnapshotInfo>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| {
            StewardError::Io(format!("Failed to read snapshot directory: {}", e))
        })? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if let Some(info) = self.load_info(&entry.path()) {
                snapshots.push(info);
            }
        }

        snapshots.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        Ok(snapshots)
    }

    /// Parse a snapshot directory; incomplete or unreadable ones yield `None`
    fn load_info(&self, dir: &Path) -> Option<SnapshotInfo> {
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.is_file() {
            debug!(dir = %dir.display(), "Skipping snapshot without metadata");
            return None;
        }
        match read_json_required::<SnapshotMetadata, _>(&metadata_path) {
            Ok(metadata) => Some(SnapshotInfo {
                metadata,
                path: dir.to_path_buf(),
                protected: false,
            }),
            Err(e) => {
                warn!(dir = %dir.display(), "Ignoring snapshot with unreadable metadata: {}", e);
                None
            }
        }
    }

    /// A complete snapshot by id
    pub fn get(&self, id: &SnapshotId) -> StewardResult<SnapshotInfo> {
        self.load_info(&self.snapshot_path(id))
            .ok_or_else(|| StewardError::snapshot_not_found(id.as_str()))
    }

    /// The newest complete snapshot, if any
    pub fn latest(&self) -> StewardResult<Option<SnapshotInfo>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Resolve `latest` or an explicit id to a complete snapshot
    pub fn resolve(&self, reference: &str) -> StewardResult<SnapshotInfo> {
        if reference == LATEST {
            return self
                .latest()?
                .ok_or_else(|| StewardError::snapshot_not_found(LATEST));
        }
        let id = SnapshotId::parse(reference)
            .map_err(|_| StewardError::snapshot_not_found(reference))?;
        self.get(&id)
    }

    /// Remove a complete snapshot
    pub fn delete(&self, id: &SnapshotId) -> StewardResult<()> {
        let path = self.snapshot_path(id);
        if !path.join(METADATA_FILE).exists() {
            return Err(StewardError::snapshot_not_found(id.as_str()));
        }
        fs::remove_dir_all(&path).map_err(|e| {
            StewardError::Io(format!("Failed to delete snapshot {}: {}", id, e))
        })?;
        info!(snapshot = %id, "Snapshot deleted");
        Ok(())
    }

    /// Remove every complete snapshot, returning the ids removed
    pub fn delete_all(&self) -> StewardResult<Vec<SnapshotId>> {
        let mut deleted = Vec::new();
        for info in self.list()? {
            self.delete(info.id())?;
            deleted.push(info.id().clone());
        }
        Ok(deleted)
    }

    /// Working directories left behind by aborted snapshot attempts
    pub fn partials(&self) -> StewardResult<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut partials = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) && entry.file_type()?.is_dir() {
                partials.push(entry.path());
            }
        }
        partials.sort();
        Ok(partials)
    }

    /// Delete abandoned working directories
    ///
    /// Only safe while no snapshot is being written, i.e. under the
    /// lifecycle lock.
    pub fn collect_garbage(&self) -> StewardResult<Vec<PathBuf>> {
        let partials = self.partials()?;
        for path in &partials {
            fs::remove_dir_all(path)?;
            info!(dir = %path.display(), "Removed abandoned snapshot working directory");
        }
        Ok(partials)
    }

    /// Recompute payload checksums and compare them with the metadata
    pub fn verify(&self, info: &SnapshotInfo) -> VerifyReport {
        verify_snapshot(info)
    }
}

/// Re-hash a snapshot's payloads against its recorded checksums
pub fn verify_snapshot(info: &SnapshotInfo) -> VerifyReport {
    let expected = &info.metadata.checksums;
    let payloads = [
        ("config", info.config_path(), &expected.config),
        ("database", info.database_dump_path(), &expected.database),
        ("tree", info.tree_archive_path(), &expected.tree),
    ];

    let mut problems = Vec::new();
    for (name, path, expected) in payloads {
        match sha256_file(&path) {
            Ok(actual) if actual == *expected => {}
            Ok(_) => problems.push(format!("{} checksum mismatch ({})", name, path.display())),
            Err(_) => problems.push(format!("{} payload missing ({})", name, path.display())),
        }
    }

    VerifyReport {
        id: info.id().clone(),
        problems,
    }
}
