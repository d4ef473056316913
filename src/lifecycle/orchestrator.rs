//! Install, update, rollback and uninstall
//!
//! Each operation is a straight line of steps under the lifecycle lock.
//! Precondition failures come back as `Err` before anything is touched; once
//! the host has been changed, a failing step ends the operation and is
//! reported through a `LifecycleResult` naming the step and the snapshot to
//! recover from.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{error, info, warn};

use super::health::{advisory_probe, inactive, start_all, stop_all, wait_until_active};
use super::lock::InstallationLock;
use super::preflight::Preflight;
use super::signals::InterruptGuard;
use crate::backup::archive::{clear_tree, extract_tree};
use crate::backup::{
    BackupManager, Exclusions, RestoreEngine, RetentionPlan, RetentionPolicy, SnapshotOutcome,
    SnapshotStore,
};
use crate::config::{Settings, StewardPaths};
use crate::credentials::{CredentialContext, DbConnection, SecureString};
use crate::error::{StewardError, StewardResult};
use crate::models::{
    AppConfig, Installation, LifecycleResult, Operation, SnapshotId, SnapshotInfo, SnapshotKind,
};
use crate::system::{Host, Release, ServiceAccount, ServiceStatus};
use crate::version::{classify, Version, VersionChange};

/// Shown whenever an update fails after its schema migration may have run
pub const MANUAL_RECOVERY_NOTICE: &str = "Schema migrations are not reversed automatically. \
     Inspect the failure, then roll back to the pre-update snapshot if the \
     application cannot be repaired in place.";

/// Parameters of an install
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Expected release version; the bundle must match when given
    pub version: Option<Version>,
}

/// Parameters of an update
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub version: Option<Version>,
    /// Operator confirmed reinstalling the installed version
    pub allow_reinstall: bool,
    /// Operator confirmed installing an older version
    pub allow_downgrade: bool,
}

/// Parameters of an uninstall
#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    /// Take a `final-pre-uninstall` snapshot first
    pub final_snapshot: bool,
    /// Abort before removing anything if the final snapshot fails
    pub require_final_snapshot: bool,
    /// Delete every snapshot at the end
    pub delete_snapshots: bool,
}

/// One best-effort uninstall step
#[derive(Debug, Clone)]
pub struct UninstallStep {
    pub step: String,
    pub ok: bool,
    pub detail: Option<String>,
}

/// Everything an uninstall did or failed to do
#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub steps: Vec<UninstallStep>,
    pub final_snapshot: Option<SnapshotId>,
    pub deleted_snapshots: Vec<SnapshotId>,
    pub services: Vec<ServiceStatus>,
}

impl UninstallReport {
    fn record(&mut self, step: impl Into<String>, result: StewardResult<()>) {
        let step = step.into();
        match result {
            Ok(()) => {
                info!(step = %step, "Uninstall step done");
                self.steps.push(UninstallStep {
                    step,
                    ok: true,
                    detail: None,
                });
            }
            Err(e) => {
                warn!(step = %step, "Uninstall step failed (continuing): {}", e);
                self.steps.push(UninstallStep {
                    step,
                    ok: false,
                    detail: Some(e.to_string()),
                });
            }
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &UninstallStep> {
        self.steps.iter().filter(|s| !s.ok)
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn to_result(&self) -> LifecycleResult {
        let failed: Vec<&str> = self.failures().map(|s| s.step.as_str()).collect();
        LifecycleResult {
            operation: Operation::Uninstall,
            success: failed.is_empty(),
            services: self.services.clone(),
            recovery_snapshot: self.final_snapshot.clone(),
            failed_step: failed.first().map(|s| s.to_string()),
            message: if failed.is_empty() {
                "Installation removed".to_string()
            } else {
                format!("Installation removed with failures: {}", failed.join(", "))
            },
            auto_restored: false,
        }
    }
}

/// Snapshot of the installation's state for `status`
#[derive(Debug, Clone)]
pub struct InstallationStatus {
    pub root: PathBuf,
    pub installed: bool,
    pub version: Option<Version>,
    pub services: Vec<ServiceStatus>,
    pub snapshots: usize,
    pub latest_snapshot: Option<SnapshotId>,
    pub abandoned_partials: usize,
}

/// A step failure inside an operation
struct StepError {
    step: &'static str,
    error: StewardError,
}

trait AtStep<T> {
    fn at(self, step: &'static str) -> Result<T, StepError>;
}

impl<T> AtStep<T> for StewardResult<T> {
    fn at(self, step: &'static str) -> Result<T, StepError> {
        self.map_err(|error| StepError { step, error })
    }
}

/// Drives the lifecycle operations against one installation
pub struct Orchestrator<'a> {
    paths: &'a StewardPaths,
    settings: &'a Settings,
    host: &'a Host,
    installation: Installation,
    store: SnapshotStore,
}

impl<'a> Orchestrator<'a> {
    pub fn new(paths: &'a StewardPaths, settings: &'a Settings, host: &'a Host) -> Self {
        Self {
            paths,
            settings,
            host,
            installation: Installation::from_settings(settings),
            store: SnapshotStore::new(paths.snapshot_dir()),
        }
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn lock(&self) -> StewardResult<InstallationLock> {
        InstallationLock::acquire(&self.paths.lock_file(), &self.installation.root)
    }

    fn preflight(&self) -> Preflight<'_> {
        Preflight::new(&self.settings.preflight)
    }

    fn exclusions(&self) -> Exclusions {
        Exclusions::new(&self.settings.archive.exclude)
    }

    fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::from(&self.settings.retention)
    }

    fn backup_manager(&self) -> BackupManager<'_> {
        BackupManager::new(
            &self.installation,
            &self.store,
            self.retention(),
            self.exclusions(),
            self.host,
        )
    }

    fn restore_engine(&self) -> RestoreEngine<'_> {
        RestoreEngine::new(
            &self.installation,
            self.host,
            &self.settings.health,
        )
    }

    /// Credentials recovered from the installed config file
    fn credentials(&self) -> StewardResult<CredentialContext> {
        let config = self.installation.load_config()?;
        CredentialContext::from_config(&config, self.host.credentials.as_ref())
    }

    /// Credentials from the config captured in `snapshot`
    fn snapshot_credentials(&self, snapshot: &SnapshotInfo) -> StewardResult<CredentialContext> {
        let config = AppConfig::load(&snapshot.config_path())?;
        CredentialContext::from_config(&config, self.host.credentials.as_ref())
    }

    fn service_statuses(&self) -> Vec<ServiceStatus> {
        self.host.services.statuses(&self.installation.services)
    }

    fn failed(&self, operation: Operation, failure: StepError) -> LifecycleResult {
        error!(%operation, step = failure.step, "{}", failure.error);
        LifecycleResult::failed(operation, failure.step, &failure.error)
            .with_services(self.service_statuses())
    }

    /// Poll the service set; a timeout is a consistency failure
    fn verify_services(&self, recovery: Option<&SnapshotId>) -> StewardResult<Vec<ServiceStatus>> {
        wait_until_active(
            self.host.services.as_ref(),
            &self.installation.services,
            &self.settings.health,
        )
        .map_err(|statuses| StewardError::Consistency {
            step: "verify services".into(),
            detail: format!("services not active: {}", inactive(&statuses).join(", ")),
            recovery: recovery.cloned(),
        })
    }

    fn harden(&self, account: &ServiceAccount) {
        if let Err(e) = self.host.hardener.harden(&self.installation.root, account) {
            warn!("Hardening failed (continuing): {}", e);
        }
    }

    // ---- install -------------------------------------------------------

    /// Fresh install of the release bundle
    pub fn install(&self, request: &InstallRequest) -> StewardResult<LifecycleResult> {
        let _lock = self.lock()?;
        let root = &self.installation.root;

        self.preflight().run(&[root.as_path(), self.store.root()])?;
        if self.installation.exists() {
            return Err(StewardError::Precondition(format!(
                "An installation already exists at {}; use update instead",
                root.display()
            )));
        }
        if self.installation.has_remnants() {
            return Err(StewardError::Precondition(format!(
                "Remnants of a previous installation exist at {}; run uninstall first",
                root.display()
            )));
        }

        let release = self.host.packages.fetch(request.version.as_ref())?;
        let credentials =
            CredentialContext::generate(&self.settings.database, self.host.credentials.as_ref())?;
        info!(version = %release.version, root = %root.display(), "Installing");

        match self.run_install(&release, &credentials) {
            Ok((services, snapshot)) => Ok(LifecycleResult::succeeded(
                Operation::Install,
                format!("Installed version {}", release.version),
            )
            .with_services(services)
            .with_snapshot(Some(snapshot))),
            Err(failure) => {
                let mut result = self.failed(Operation::Install, failure);
                result.message.push_str(
                    "; the partial installation was left in place, run uninstall before retrying",
                );
                Ok(result)
            }
        }
    }

    fn run_install(
        &self,
        release: &Release,
        credentials: &CredentialContext,
    ) -> Result<(Vec<ServiceStatus>, SnapshotId), StepError> {
        let root = &self.installation.root;

        let account = self
            .host
            .accounts
            .ensure(&self.installation.service_account, root)
            .at("create service account")?;

        fs::create_dir_all(root)
            .map_err(StewardError::from)
            .and_then(|_| extract_tree(&release.tree_archive, root))
            .at("extract tree")?;
        info!(root = %root.display(), "Tree extracted");

        self.host
            .packages
            .install_dependencies(release, root, &account)
            .at("install dependencies")?;

        self.host
            .database
            .provision(&credentials.database)
            .at("provision database")?;

        self.write_app_config(credentials, &account)
            .at("write config")?;

        self.harden(&account);

        self.host
            .migrator
            .migrate(root, &account)
            .at("migrate schema")?;

        for name in &self.installation.services {
            self.host.services.enable(name).at("enable services")?;
        }
        start_all(self.host.services.as_ref(), &self.installation.services)
            .at("start services")?;
        let services = self.verify_services(None).at("verify services")?;

        self.installation
            .write_marker(&release.version)
            .at("record release")?;

        let outcome = self
            .backup_manager()
            .create_snapshot(SnapshotKind::Initial, credentials, None)
            .at("initial snapshot")?;

        advisory_probe(self.host.probe.as_ref(), &self.settings.health);
        Ok((services, outcome.id))
    }

    fn write_app_config(
        &self,
        credentials: &CredentialContext,
        account: &ServiceAccount,
    ) -> StewardResult<()> {
        let config = AppConfig {
            database: credentials.database.to_section(true),
            secret_key: credentials
                .signing_key
                .as_ref()
                .map(|key| key.as_str().to_string()),
            allowed_hosts: self.settings.app.allowed_hosts.clone(),
            extra: BTreeMap::new(),
        };
        let path = &self.installation.config_file;
        config.save(path)?;
        if nix::unistd::Uid::effective().is_root() {
            nix::unistd::chown(
                path.as_path(),
                Some(nix::unistd::Uid::from_raw(0)),
                Some(nix::unistd::Gid::from_raw(account.gid)),
            )?;
        }
        info!(config = %path.display(), "Config written");
        Ok(())
    }

    // ---- update --------------------------------------------------------

    /// Replace the installed release with the bundle's
    pub fn update(&self, request: &UpdateRequest) -> StewardResult<LifecycleResult> {
        let _lock = self.lock()?;
        self.preflight().check_privileges()?;
        self.preflight().check_free_space(self.store.root())?;

        let installed = self.installation.installed_version()?;
        let release = self.host.packages.fetch(request.version.as_ref())?;

        match classify(&installed, &release.version) {
            VersionChange::Upgrade => {
                info!(from = %installed, to = %release.version, "Upgrading")
            }
            VersionChange::Same if request.allow_reinstall => {
                warn!(version = %installed, "Reinstalling the installed version")
            }
            VersionChange::Same => {
                return Err(StewardError::Precondition(format!(
                    "Version {} is already installed; confirm the reinstall to proceed",
                    installed
                )))
            }
            VersionChange::Downgrade if request.allow_downgrade => {
                warn!(from = %installed, to = %release.version, "Downgrading")
            }
            VersionChange::Downgrade => {
                return Err(StewardError::Precondition(format!(
                    "Version {} is older than the installed {}; confirm the downgrade to proceed",
                    release.version, installed
                )))
            }
        }

        let credentials = self.credentials()?;
        let account = self
            .host
            .accounts
            .require(&self.installation.service_account)?;

        let snapshot = match self
            .backup_manager()
            .create_snapshot(SnapshotKind::PreUpdate, &credentials, None)
        {
            Ok(outcome) => outcome.id,
            Err(error) => {
                return Ok(self.failed(
                    Operation::Update,
                    StepError {
                        step: "pre-update snapshot",
                        error,
                    },
                ))
            }
        };

        if let Err(error) = stop_all(self.host.services.as_ref(), &self.installation.services) {
            return Ok(self
                .failed(
                    Operation::Update,
                    StepError {
                        step: "stop services",
                        error,
                    },
                )
                .with_snapshot(Some(snapshot)));
        }

        if let Err(failure) = self.upgrade_in_place(&release, &account) {
            return Ok(self.auto_restore(Operation::Update, failure, &snapshot, &credentials));
        }

        match self.finish_update(&account, &snapshot) {
            Ok(services) => Ok(LifecycleResult::succeeded(
                Operation::Update,
                format!("Updated {} -> {}", installed, release.version),
            )
            .with_services(services)
            .with_snapshot(Some(snapshot))),
            Err(failure) => {
                warn!("{}", MANUAL_RECOVERY_NOTICE);
                let mut result = self
                    .failed(Operation::Update, failure)
                    .with_snapshot(Some(snapshot));
                result.message.push_str(". ");
                result.message.push_str(MANUAL_RECOVERY_NOTICE);
                Ok(result)
            }
        }
    }

    /// Dependencies and tree; failures here are restored automatically
    fn upgrade_in_place(&self, release: &Release, account: &ServiceAccount) -> Result<(), StepError> {
        self.host
            .packages
            .install_dependencies(release, &self.installation.root, account)
            .at("upgrade dependencies")?;
        self.replace_tree(release).at("replace tree")?;
        Ok(())
    }

    /// Swap the tree for the release's, carrying the live config across
    fn replace_tree(&self, release: &Release) -> StewardResult<()> {
        let _guard = InterruptGuard::new("replace tree")?;
        let root = &self.installation.root;
        let config = &self.installation.config_file;

        let staging = self.paths.staging_dir();
        fs::create_dir_all(&staging)?;
        let stash = staging.join(format!("{}.preserved", self.installation.config_file_name()));
        fs::copy(config, &stash).map_err(|e| {
            StewardError::Io(format!("Failed to preserve {}: {}", config.display(), e))
        })?;

        let removed = clear_tree(root, &self.exclusions())?;
        info!(removed, "Old tree cleared");
        extract_tree(&release.tree_archive, root)?;

        if let Some(parent) = config.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&stash, config)?;
        fs::remove_file(&stash)?;
        self.installation.write_marker(&release.version)?;
        info!(version = %release.version, "Tree replaced");
        Ok(())
    }

    /// Migration, restart, verification; failures need manual recovery
    fn finish_update(
        &self,
        account: &ServiceAccount,
        snapshot: &SnapshotId,
    ) -> Result<Vec<ServiceStatus>, StepError> {
        self.harden(account);
        self.host
            .migrator
            .migrate(&self.installation.root, account)
            .map_err(|e| StewardError::Consistency {
                step: "migrate schema".into(),
                detail: e.to_string(),
                recovery: Some(snapshot.clone()),
            })
            .at("migrate schema")?;
        start_all(self.host.services.as_ref(), &self.installation.services)
            .at("start services")?;
        let services = self.verify_services(Some(snapshot)).at("verify services")?;
        advisory_probe(self.host.probe.as_ref(), &self.settings.health);
        Ok(services)
    }

    fn auto_restore(
        &self,
        operation: Operation,
        failure: StepError,
        snapshot: &SnapshotId,
        credentials: &CredentialContext,
    ) -> LifecycleResult {
        error!(
            step = failure.step,
            snapshot = %snapshot,
            "{}; restoring the safety snapshot", failure.error
        );

        let restored = self.store.get(snapshot).and_then(|info| {
            self.restore_engine()
                .restore(&info, credentials, Some(snapshot))
                .map_err(StewardError::from)
        });

        match restored {
            Ok(healthy) => {
                info!(snapshot = %snapshot, "Pre-operation state restored");
                LifecycleResult {
                    operation,
                    success: false,
                    services: healthy.services,
                    recovery_snapshot: Some(snapshot.clone()),
                    failed_step: Some(failure.step.to_string()),
                    message: format!(
                        "{}; the installation was restored from snapshot {}",
                        failure.error, snapshot
                    ),
                    auto_restored: true,
                }
            }
            Err(restore_error) => {
                error!(snapshot = %snapshot, "Automatic restore failed: {}", restore_error);
                let mut result = self
                    .failed(operation, failure)
                    .with_snapshot(Some(snapshot.clone()));
                result.message = format!(
                    "{}; automatic restore failed: {}",
                    result.message, restore_error
                );
                result
            }
        }
    }

    // ---- rollback ------------------------------------------------------

    /// Restore a snapshot over the live installation
    ///
    /// `reference` is a snapshot id or `latest`. The installation may be
    /// missing or half-restored; the target snapshot carries everything the
    /// restore needs, including its credentials.
    pub fn rollback(&self, reference: &str) -> StewardResult<LifecycleResult> {
        let _lock = self.lock()?;
        self.preflight().check_privileges()?;

        let target = self.store.resolve(reference)?;
        let credentials = self.snapshot_credentials(&target)?;

        let safety = if self.installation.exists() {
            match self.take_safety_snapshot(&target) {
                Ok(outcome) => Some(outcome.id),
                Err(error) => {
                    return Ok(self.failed(
                        Operation::Rollback,
                        StepError {
                            step: "pre-rollback snapshot",
                            error,
                        },
                    ))
                }
            }
        } else {
            warn!(
                root = %self.installation.root.display(),
                "No complete installation; rolling back without a pre-rollback snapshot"
            );
            None
        };

        let result = match self
            .restore_engine()
            .restore(&target, &credentials, safety.as_ref())
        {
            Ok(healthy) => {
                let message = match &safety {
                    Some(id) => format!(
                        "Restored snapshot {}; the previous state is saved as {}",
                        target.id(),
                        id
                    ),
                    None => format!("Restored snapshot {}", target.id()),
                };
                LifecycleResult::succeeded(Operation::Rollback, message)
                    .with_services(healthy.services)
                    .with_snapshot(safety)
            }
            Err(failure) => {
                let step = failure.step.to_string();
                let error = StewardError::from(failure);
                error!(step = %step, "{}", error);
                LifecycleResult::failed(Operation::Rollback, step, &error)
                    .with_services(self.service_statuses())
            }
        };
        Ok(result)
    }

    /// `pre-rollback` snapshot whose retention pass spares `target`
    fn take_safety_snapshot(&self, target: &SnapshotInfo) -> StewardResult<SnapshotOutcome> {
        let credentials = match self.credentials() {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Installed config unreadable ({}); using the target's credentials", e);
                self.snapshot_credentials(target)?
            }
        };
        info!(snapshot = %target.id(), "Rollback target protected from retention");
        self.backup_manager().create_snapshot(
            SnapshotKind::PreRollback,
            &credentials,
            Some(target.id()),
        )
    }

    // ---- uninstall -----------------------------------------------------

    /// Remove the installation; every step is attempted regardless of the others
    pub fn uninstall(&self, options: &UninstallOptions) -> StewardResult<UninstallReport> {
        let _lock = self.lock()?;
        self.preflight().check_privileges()?;

        let account = self.host.accounts.lookup(&self.installation.service_account)?;
        if !self.installation.has_remnants() && account.is_none() {
            return Err(StewardError::installation_not_found(&self.installation.root));
        }

        let mut report = UninstallReport::default();

        if options.final_snapshot && self.installation.exists() {
            let outcome = self.credentials().and_then(|credentials| {
                self.backup_manager()
                    .create_snapshot(SnapshotKind::FinalPreUninstall, &credentials, None)
            });
            match outcome {
                Ok(SnapshotOutcome { id, .. }) => {
                    info!(snapshot = %id, "Final snapshot taken");
                    report.final_snapshot = Some(id);
                }
                Err(e) if options.require_final_snapshot => {
                    return Err(StewardError::Consistency {
                        step: "final snapshot".into(),
                        detail: format!("{}; nothing was removed", e),
                        recovery: None,
                    })
                }
                Err(e) => report.record("final snapshot", Err(e)),
            }
        } else if options.final_snapshot {
            warn!("No complete installation; skipping the final snapshot");
        }

        for name in self.installation.services.iter().rev() {
            report.record(format!("stop {}", name), self.host.services.stop(name));
            report.record(format!("disable {}", name), self.host.services.disable(name));
            report.record(format!("remove unit {}", name), self.host.services.remove_unit(name));
        }

        report.record("drop database", self.drop_database());
        report.record("delete tree", self.delete_tree());
        report.record(
            "delete service account",
            self.host.accounts.remove(&self.installation.service_account),
        );

        if options.delete_snapshots {
            match self.store.delete_all() {
                Ok(deleted) => {
                    report.deleted_snapshots = deleted;
                    report.record("delete snapshots", Ok(()));
                }
                Err(e) => report.record("delete snapshots", Err(e)),
            }
            report.record(
                "remove abandoned snapshot directories",
                self.store.collect_garbage().map(|_| ()),
            );
        } else {
            info!(dir = %self.store.root().display(), "Snapshots kept");
        }

        report.services = self.service_statuses();
        Ok(report)
    }

    /// Database and role names, from the config file if it is still readable
    fn database_target(&self) -> DbConnection {
        let db = &self.settings.database;
        match self.installation.load_config() {
            Ok(config) => DbConnection {
                host: config.database.host,
                port: config.database.port,
                name: config.database.name,
                user: config.database.user,
                password: SecureString::default(),
            },
            Err(e) => {
                warn!("Config unreadable ({}); using configured database names", e);
                DbConnection {
                    host: db.host.clone(),
                    port: db.port,
                    name: db.name.clone(),
                    user: db.user.clone(),
                    password: SecureString::default(),
                }
            }
        }
    }

    fn drop_database(&self) -> StewardResult<()> {
        let target = self.database_target();
        let _guard = InterruptGuard::new("drop database")?;
        self.host.database.destroy(&target)
    }

    fn delete_tree(&self) -> StewardResult<()> {
        let _guard = InterruptGuard::new("delete tree")?;
        let root = &self.installation.root;
        if root.exists() {
            fs::remove_dir_all(root)?;
        }
        let config = &self.installation.config_file;
        if self.installation.config_in_tree().is_none() && config.exists() {
            fs::remove_file(config)?;
        }
        Ok(())
    }

    // ---- snapshots -----------------------------------------------------

    /// Take a snapshot outside of any lifecycle operation
    pub fn snapshot(&self, kind: SnapshotKind) -> StewardResult<SnapshotOutcome> {
        let _lock = self.lock()?;
        self.installation.installed_version()?;
        let credentials = self.credentials()?;
        self.backup_manager().create_snapshot(kind, &credentials, None)
    }

    /// Apply retention now; with `dry_run` only report the plan
    pub fn prune(&self, dry_run: bool) -> StewardResult<RetentionPlan> {
        let _lock = self.lock()?;
        let policy = self.retention();
        let plan = policy.plan(&self.store.list()?, None);
        if dry_run || policy.is_unlimited() {
            return Ok(plan);
        }
        let deleted = policy.enforce(&self.store, None)?;
        Ok(RetentionPlan {
            keep: plan.keep,
            delete: deleted,
        })
    }

    /// Delete working directories of aborted snapshots
    pub fn collect_garbage(&self) -> StewardResult<Vec<PathBuf>> {
        let _lock = self.lock()?;
        self.store.collect_garbage()
    }

    pub fn status(&self) -> StewardResult<InstallationStatus> {
        let snapshots = self.store.list()?;
        Ok(InstallationStatus {
            root: self.installation.root.clone(),
            installed: self.installation.exists(),
            version: self.installation.installed_version().ok(),
            services: self.service_statuses(),
            snapshots: snapshots.len(),
            latest_snapshot: snapshots.first().map(|s| s.id().clone()),
            abandoned_partials: self.store.partials()?.len(),
        })
    }
}
