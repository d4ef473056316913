//! Snapshot restoration
//!
//! Rebuilds the live installation from a snapshot in a fixed order. The
//! database goes first: a failed database load with the old tree still in
//! place is easier to recover from than a half-replaced tree. The live tree
//! is deleted entirely, derived subtrees included, and those are rebuilt from
//! the restored tree. Every step's failure stops the sequence; nothing is
//! undone automatically.

use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;

use thiserror::Error;
use tracing::{info, warn};

use super::archive::{clear_tree, extract_tree, Exclusions};
use super::store::verify_snapshot;
use crate::config::settings::HealthSettings;
use crate::credentials::CredentialContext;
use crate::error::StewardError;
use crate::lifecycle::health::{advisory_probe, inactive, start_all, stop_all, wait_until_active};
use crate::lifecycle::signals::InterruptGuard;
use crate::models::{Installation, SnapshotId, SnapshotInfo};
use crate::system::{Host, ServiceAccount, ServiceStatus};

/// Steps of a restore, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    Prepare,
    StopServices,
    RecreateDatabase,
    LoadDatabase,
    ReplaceTree,
    RebuildDependencies,
    RestoreConfig,
    StartServices,
    VerifyHealth,
}

impl fmt::Display for RestoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare restore",
            Self::StopServices => "stop services",
            Self::RecreateDatabase => "recreate database",
            Self::LoadDatabase => "load database dump",
            Self::ReplaceTree => "replace application tree",
            Self::RebuildDependencies => "rebuild dependencies",
            Self::RestoreConfig => "restore config file",
            Self::StartServices => "start services",
            Self::VerifyHealth => "verify services",
        };
        f.write_str(name)
    }
}

/// A restore that stopped partway
#[derive(Error, Debug)]
#[error("Restore failed at step '{step}': {reason}{}", recovery_suffix(.recovery))]
pub struct RestoreFailure {
    pub step: RestoreStep,
    pub reason: String,
    /// Services that did not reach the active state
    pub failed_services: Vec<String>,
    /// Safety snapshot taken before the restore began
    pub recovery: Option<SnapshotId>,
}

fn recovery_suffix(recovery: &Option<SnapshotId>) -> String {
    match recovery {
        Some(id) => format!(" (state before the restore is in snapshot {})", id),
        None => String::new(),
    }
}

/// A restore that finished with every service active
#[derive(Debug, Clone)]
pub struct Healthy {
    pub services: Vec<ServiceStatus>,
    /// Advisory HTTP probe result; `None` if no probe is configured
    pub probe: Option<bool>,
}

/// Reconstructs the installation from a snapshot
pub struct RestoreEngine<'a> {
    installation: &'a Installation,
    host: &'a Host,
    health: &'a HealthSettings,
}

impl<'a> RestoreEngine<'a> {
    pub fn new(
        installation: &'a Installation,
        host: &'a Host,
        health: &'a HealthSettings,
    ) -> Self {
        Self {
            installation,
            host,
            health,
        }
    }

    /// Restore `snapshot` over the live installation
    ///
    /// `recovery` is the safety snapshot taken beforehand; it is reported on
    /// failure as the way back.
    pub fn restore(
        &self,
        snapshot: &SnapshotInfo,
        credentials: &CredentialContext,
        recovery: Option<&SnapshotId>,
    ) -> Result<Healthy, RestoreFailure> {
        let fail = |step: RestoreStep, err: StewardError| RestoreFailure {
            step,
            reason: err.to_string(),
            failed_services: Vec::new(),
            recovery: recovery.cloned(),
        };

        info!(snapshot = %snapshot.id(), "Restoring snapshot");
        let report = verify_snapshot(snapshot);
        for problem in &report.problems {
            warn!(snapshot = %snapshot.id(), "Integrity check: {}", problem);
        }

        let account = self
            .host
            .accounts
            .require(&self.installation.service_account)
            .map_err(|e| fail(RestoreStep::Prepare, e))?;
        let names = &self.installation.services;
        let conn = &credentials.database;

        // 1
        stop_all(self.host.services.as_ref(), names)
            .map_err(|e| fail(RestoreStep::StopServices, e))?;
        info!("Services stopped");

        // 2
        {
            let _guard = InterruptGuard::new("recreate database")
                .map_err(|e| fail(RestoreStep::RecreateDatabase, e))?;
            self.host
                .database
                .recreate(conn)
                .map_err(|e| fail(RestoreStep::RecreateDatabase, e))?;
        }
        info!(database = %conn.name, "Database recreated");

        // 3
        self.host
            .database
            .load(conn, &account, &snapshot.database_dump_path())
            .map_err(|e| fail(RestoreStep::LoadDatabase, e))?;
        info!(database = %conn.name, "Database loaded");

        // 4
        {
            let _guard = InterruptGuard::new("replace tree")
                .map_err(|e| fail(RestoreStep::ReplaceTree, e))?;
            self.replace_tree(snapshot)
                .map_err(|e| fail(RestoreStep::ReplaceTree, e))?;
        }
        info!(root = %self.installation.root.display(), "Tree replaced");

        // 5
        self.host
            .packages
            .rebuild_dependencies(&self.installation.root, &account)
            .map_err(|e| fail(RestoreStep::RebuildDependencies, e))?;
        info!("Derived files rebuilt");

        // 6
        self.restore_config(snapshot, &account)
            .map_err(|e| fail(RestoreStep::RestoreConfig, e))?;
        info!(config = %self.installation.config_file.display(), "Config restored");

        // 7
        if let Err(e) = self.host.hardener.harden(&self.installation.root, &account) {
            warn!("Hardening failed (continuing): {}", e);
        }

        // 8
        start_all(self.host.services.as_ref(), names)
            .map_err(|e| fail(RestoreStep::StartServices, e))?;
        let services = match wait_until_active(self.host.services.as_ref(), names, self.health) {
            Ok(services) => services,
            Err(services) => {
                let failed = inactive(&services);
                return Err(RestoreFailure {
                    step: RestoreStep::VerifyHealth,
                    reason: format!("services not active: {}", failed.join(", ")),
                    failed_services: failed,
                    recovery: recovery.cloned(),
                });
            }
        };
        let probe = advisory_probe(self.host.probe.as_ref(), self.health);

        info!(snapshot = %snapshot.id(), "Restore complete");
        Ok(Healthy { services, probe })
    }

    fn replace_tree(&self, snapshot: &SnapshotInfo) -> Result<(), StewardError> {
        let root = &self.installation.root;
        let removed = clear_tree(root, &Exclusions::default())?;
        info!(root = %root.display(), removed, "Live tree cleared");
        extract_tree(&snapshot.tree_archive_path(), root)
    }

    fn restore_config(
        &self,
        snapshot: &SnapshotInfo,
        account: &ServiceAccount,
    ) -> Result<(), StewardError> {
        let target = &self.installation.config_file;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(snapshot.config_path(), target).map_err(|e| {
            StewardError::Io(format!(
                "Failed to copy config to {}: {}",
                target.display(),
                e
            ))
        })?;
        fs::set_permissions(target, fs::Permissions::from_mode(0o640))?;
        if nix::unistd::Uid::effective().is_root() {
            nix::unistd::chown(
                target,
                Some(nix::unistd::Uid::from_raw(0)),
                Some(nix::unistd::Gid::from_raw(account.gid)),
            )?;
        }
        Ok(())
    }
}
