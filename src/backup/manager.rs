//! Snapshot creation
//!
//! A snapshot is assembled in a hidden working directory and only renamed to
//! its final name after the metadata file, written last, is in place. A
//! failure before that leaves the working directory behind for inspection;
//! listings, retention and restore never see it.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chrono::Utc;
use nix::unistd::{chown, Gid, Uid};
use tracing::{error, info, warn};

use super::archive::{archive_tree, file_size, sha256_file, Exclusions};
use super::retention::RetentionPolicy;
use super::store::SnapshotStore;
use crate::credentials::CredentialContext;
use crate::error::{StewardError, StewardResult};
use crate::models::snapshot::{
    CONFIG_DIR, DATABASE_DIR, METADATA_FILE, METADATA_FORMAT_VERSION, TREE_ARCHIVE,
};
use crate::models::{
    Checksums, Installation, PayloadSizes, SnapshotId, SnapshotKind, SnapshotMetadata,
};
use crate::storage::file_io::{sync_dir, write_json_atomic};
use crate::system::{Host, ServiceAccount};

/// A freshly created snapshot and what retention removed afterwards
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub id: SnapshotId,
    pub pruned: Vec<SnapshotId>,
}

/// Produces snapshots of the live installation
pub struct BackupManager<'a> {
    installation: &'a Installation,
    store: &'a SnapshotStore,
    retention: RetentionPolicy,
    exclude: Exclusions,
    host: &'a Host,
}

impl<'a> BackupManager<'a> {
    pub fn new(
        installation: &'a Installation,
        store: &'a SnapshotStore,
        retention: RetentionPolicy,
        exclude: Exclusions,
        host: &'a Host,
    ) -> Self {
        Self {
            installation,
            store,
            retention,
            exclude,
            host,
        }
    }

    /// Capture config, database and tree, then apply retention
    ///
    /// `protected` is exempt from the retention pass that follows.
    pub fn create_snapshot(
        &self,
        kind: SnapshotKind,
        credentials: &CredentialContext,
        protected: Option<&SnapshotId>,
    ) -> StewardResult<SnapshotOutcome> {
        let source_version = self.installation.installed_version()?;
        if !self.installation.config_file.is_file() {
            return Err(StewardError::Precondition(format!(
                "Application config not found: {}",
                self.installation.config_file.display()
            )));
        }
        let account = self
            .host
            .accounts
            .require(&self.installation.service_account)?;

        self.store.ensure_root()?;
        let created_at = Utc::now();
        let id = self.store.allocate_id(created_at, kind);
        let work = self.store.partial_path(&id);
        info!(snapshot = %id, %kind, "Creating snapshot");

        let metadata = match self.write_payloads(&id, &work, &account, credentials) {
            Ok((checksums, sizes)) => SnapshotMetadata {
                format_version: METADATA_FORMAT_VERSION,
                id: id.clone(),
                kind,
                created_at,
                source_version: source_version.to_string(),
                config_file: self.installation.config_file_name(),
                database_dump: dump_file_name(&credentials.database.name),
                checksums,
                sizes,
            },
            Err(e) => {
                error!(
                    snapshot = %id,
                    dir = %work.display(),
                    "Snapshot aborted; working directory left for inspection: {}",
                    e
                );
                return Err(e);
            }
        };

        write_json_atomic(work.join(METADATA_FILE), &metadata)?;
        let final_path = self.store.snapshot_path(&id);
        fs::rename(&work, &final_path).map_err(|e| {
            StewardError::Io(format!("Failed to publish snapshot {}: {}", id, e))
        })?;
        sync_dir(self.store.root())?;
        info!(snapshot = %id, size = metadata.sizes.total(), "Snapshot complete");

        let pruned = match self.retention.enforce(self.store, protected) {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!("Retention enforcement failed: {}", e);
                Vec::new()
            }
        };

        Ok(SnapshotOutcome { id, pruned })
    }

    /// Steps 1 to 4: working directory, config copy, dump, tree archive
    fn write_payloads(
        &self,
        id: &SnapshotId,
        work: &Path,
        account: &ServiceAccount,
        credentials: &CredentialContext,
    ) -> StewardResult<(Checksums, PayloadSizes)> {
        for dir in [work.to_path_buf(), work.join(CONFIG_DIR), work.join(DATABASE_DIR)] {
            fs::create_dir_all(&dir)?;
            grant_account(&dir, account)?;
        }

        let config_copy = work
            .join(CONFIG_DIR)
            .join(self.installation.config_file_name());
        fs::copy(&self.installation.config_file, &config_copy).map_err(|e| {
            StewardError::Io(format!(
                "Failed to copy {}: {}",
                self.installation.config_file.display(),
                e
            ))
        })?;
        info!(snapshot = %id, "Config copied");

        let dump = work
            .join(DATABASE_DIR)
            .join(dump_file_name(&credentials.database.name));
        self.host
            .database
            .dump(&credentials.database, account, &dump)?;
        info!(snapshot = %id, "Database dumped");

        let tree = work.join(TREE_ARCHIVE);
        archive_tree(&self.installation.root, &tree, &self.exclude)?;
        info!(snapshot = %id, "Tree archived");

        let checksums = Checksums {
            config: sha256_file(&config_copy)?,
            database: sha256_file(&dump)?,
            tree: sha256_file(&tree)?,
        };
        let sizes = PayloadSizes {
            config: file_size(&config_copy),
            database: file_size(&dump),
            tree: file_size(&tree),
        };
        Ok((checksums, sizes))
    }
}

/// Name of the dump file for a database
pub fn dump_file_name(database: &str) -> String {
    format!("{}.sql.gz", database)
}

/// Let the service account write into a snapshot directory
fn grant_account(dir: &Path, account: &ServiceAccount) -> StewardResult<()> {
    if Uid::effective().is_root() {
        chown(
            dir,
            Some(Uid::from_raw(account.uid)),
            Some(Gid::from_raw(account.gid)),
        )?;
    }
    fs::set_permissions(dir, fs::Permissions::from_mode(0o770))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestBed;

    #[test]
    fn test_create_snapshot_layout() {
        let bed = TestBed::installed("4.4.9");
        let creds = bed.credentials();

        let outcome = bed
            .backup_manager()
            .create_snapshot(SnapshotKind::Manual, &creds, None)
            .unwrap();

        let info = bed.store.get(&outcome.id).unwrap();
        assert_eq!(info.kind(), SnapshotKind::Manual);
        assert_eq!(info.metadata.source_version, "4.4.9");
        assert!(info.config_path().is_file());
        assert!(info.database_dump_path().is_file());
        assert!(info.tree_archive_path().is_file());
        assert!(info.size_bytes() > 0);
        assert!(bed.store.verify(&info).is_ok());
        assert!(bed.store.partials().unwrap().is_empty());

        let mode = fs::metadata(info.path.join(DATABASE_DIR))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o770);
    }

    #[test]
    fn test_failed_dump_leaves_no_visible_snapshot() {
        let bed = TestBed::installed("4.4.9");
        let creds = bed.credentials();
        bed.db.borrow_mut().fail_dump = true;

        let err = bed
            .backup_manager()
            .create_snapshot(SnapshotKind::Manual, &creds, None)
            .unwrap_err();
        assert!(matches!(err, StewardError::Tool { .. }));

        assert!(bed.store.list().unwrap().is_empty());
        let partials = bed.store.partials().unwrap();
        assert_eq!(partials.len(), 1);
        assert!(!partials[0].join(METADATA_FILE).exists());
    }

    #[test]
    fn test_retention_runs_after_creation() {
        let mut bed = TestBed::installed("4.4.9");
        bed.settings.retention.keep_count = 2;
        let creds = bed.credentials();

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                bed.backup_manager()
                    .create_snapshot(SnapshotKind::Manual, &creds, None)
                    .unwrap(),
            );
        }

        assert_eq!(ids[2].pruned, vec![ids[0].id.clone()]);
        assert_eq!(bed.store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_installation_is_precondition() {
        let bed = TestBed::empty();
        let creds = bed.credentials();
        let err = bed
            .backup_manager()
            .create_snapshot(SnapshotKind::Manual, &creds, None)
            .unwrap_err();
        assert!(err.is_precondition());
        assert!(bed.store.partials().unwrap().is_empty());
    }
}
