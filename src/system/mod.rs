//! External collaborators
//!
//! Each OS-facing concern sits behind a narrow trait so the lifecycle core
//! only sees what it needs. `Host` bundles one implementation of each; the
//! production bundle drives systemd, PostgreSQL and the package tooling.

pub mod accounts;
pub mod database;
pub mod hardening;
pub mod migrate;
pub mod packages;
pub mod probe;
pub mod runner;
pub mod services;

use std::path::PathBuf;

pub use accounts::{ServiceAccount, ServiceAccounts, SystemAccounts};
pub use database::{Database, Postgres};
pub use hardening::{FilesystemHardener, Hardener};
pub use migrate::{CommandMigrator, SchemaMigrator};
pub use packages::{BundleProvider, PackageProvider, Release};
pub use probe::{HealthProbe, HttpProbe};
pub use runner::ToolRunner;
pub use services::{ServiceManager, ServiceStatus, Systemctl};

use crate::config::{Settings, StewardPaths};
use crate::credentials::CredentialProvider;

/// The managed host as seen by the lifecycle core
pub struct Host {
    pub services: Box<dyn ServiceManager>,
    pub database: Box<dyn Database>,
    pub packages: Box<dyn PackageProvider>,
    pub migrator: Box<dyn SchemaMigrator>,
    pub accounts: Box<dyn ServiceAccounts>,
    pub hardener: Box<dyn Hardener>,
    pub probe: Box<dyn HealthProbe>,
    pub credentials: Box<dyn CredentialProvider>,
}

impl Host {
    /// Production collaborators
    ///
    /// `bundle_dir` is the release bundle to install from; operations that
    /// never fetch a release may pass any path.
    pub fn system(
        paths: &StewardPaths,
        settings: &Settings,
        bundle_dir: PathBuf,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        let runner = ToolRunner::new(paths.log_dir());
        Self {
            services: Box::new(Systemctl::new(runner.clone())),
            database: Box::new(Postgres::new(
                runner.clone(),
                settings.database.superuser_account.clone(),
                paths.staging_dir(),
            )),
            packages: Box::new(BundleProvider::new(
                bundle_dir,
                settings.commands.dependencies.clone(),
                settings.commands.rebuild.clone(),
                runner.clone(),
            )),
            migrator: Box::new(CommandMigrator::new(
                settings.commands.migrate.clone(),
                runner.clone(),
            )),
            accounts: Box::new(SystemAccounts::new(runner.clone())),
            hardener: Box::new(FilesystemHardener::new(
                settings.hardening.writable.clone(),
                settings.hardening.selinux_relabel,
                runner,
            )),
            probe: Box::new(HttpProbe::new(settings.health.probe_timeout())),
            credentials,
        }
    }
}
