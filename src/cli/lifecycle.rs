//! Install, update, rollback, uninstall and status commands

use std::path::PathBuf;

use clap::Args;

use super::confirm;
use crate::backup::SnapshotStore;
use crate::config::{Settings, StewardPaths};
use crate::credentials::{CredentialProvider, GeneratedCredentials, PromptCredentials};
use crate::display::{format_lifecycle_result, format_status, format_uninstall_report};
use crate::error::StewardResult;
use crate::lifecycle::{InstallRequest, Orchestrator, UninstallOptions, UpdateRequest};
use crate::system::Host;
use crate::version::Version;

/// Arguments of `steward install`
#[derive(Args)]
pub struct InstallArgs {
    /// Release bundle directory
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Refuse the bundle unless it holds this version
    #[arg(long)]
    pub version: Option<String>,
    /// Enter the database password instead of generating one
    #[arg(long)]
    pub prompt_secrets: bool,
}

/// Arguments of `steward update`
#[derive(Args)]
pub struct UpdateArgs {
    /// Release bundle directory
    #[arg(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Refuse the bundle unless it holds this version
    #[arg(long)]
    pub version: Option<String>,
    /// Reinstall when the bundle holds the installed version
    #[arg(long)]
    pub allow_reinstall: bool,
    /// Install a version older than the installed one
    #[arg(long)]
    pub allow_downgrade: bool,
}

/// Arguments of `steward rollback`
#[derive(Args)]
pub struct RollbackArgs {
    /// Snapshot id, or 'latest'
    #[arg(default_value = "latest")]
    pub snapshot: String,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments of `steward uninstall`
#[derive(Args)]
pub struct UninstallArgs {
    /// Do not take a final snapshot first
    #[arg(long, conflicts_with = "require_final_snapshot")]
    pub no_final_snapshot: bool,
    /// Remove nothing if the final snapshot cannot be taken
    #[arg(long)]
    pub require_final_snapshot: bool,
    /// Delete every snapshot once the installation is gone
    #[arg(long)]
    pub delete_snapshots: bool,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

fn parse_version(version: Option<&str>) -> StewardResult<Option<Version>> {
    version.map(Version::parse).transpose()
}

/// Credentials come from the installed config; ask only for what is missing
fn prompt_for_missing() -> Box<dyn CredentialProvider> {
    Box::new(PromptCredentials { confirm: false })
}

pub fn handle_install(
    paths: &StewardPaths,
    settings: &Settings,
    args: InstallArgs,
) -> StewardResult<bool> {
    let credentials: Box<dyn CredentialProvider> = if args.prompt_secrets {
        Box::new(PromptCredentials { confirm: true })
    } else {
        Box::new(GeneratedCredentials)
    };
    let host = Host::system(paths, settings, args.bundle, credentials);
    let request = InstallRequest {
        version: parse_version(args.version.as_deref())?,
    };

    println!("Installing into {}...", settings.app.install_root.display());
    let result = Orchestrator::new(paths, settings, &host).install(&request)?;
    println!("{}", format_lifecycle_result(&result));
    Ok(result.success)
}

pub fn handle_update(
    paths: &StewardPaths,
    settings: &Settings,
    args: UpdateArgs,
) -> StewardResult<bool> {
    let host = Host::system(paths, settings, args.bundle, prompt_for_missing());
    let request = UpdateRequest {
        version: parse_version(args.version.as_deref())?,
        allow_reinstall: args.allow_reinstall,
        allow_downgrade: args.allow_downgrade,
    };

    println!("Updating {}...", settings.app.install_root.display());
    let result = Orchestrator::new(paths, settings, &host).update(&request)?;
    println!("{}", format_lifecycle_result(&result));
    Ok(result.success)
}

pub fn handle_rollback(
    paths: &StewardPaths,
    settings: &Settings,
    args: RollbackArgs,
) -> StewardResult<bool> {
    // Resolve up front so a bad reference fails before any prompt
    let target = SnapshotStore::new(paths.snapshot_dir()).resolve(&args.snapshot)?;

    println!("Rollback target: {}", target.id());
    println!("  Kind:    {}", target.kind());
    println!(
        "  Created: {}",
        target.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Version: {}", target.metadata.source_version);
    println!();
    println!("WARNING: The database, application tree and config will be replaced.");
    println!("The current state is saved as a pre-rollback snapshot first, if it is complete.");

    if !confirm("Proceed with the rollback?", args.force)? {
        println!("Aborted.");
        return Ok(true);
    }

    let host = Host::system(paths, settings, PathBuf::new(), prompt_for_missing());
    let result = Orchestrator::new(paths, settings, &host).rollback(target.id().as_str())?;
    println!("{}", format_lifecycle_result(&result));
    Ok(result.success)
}

pub fn handle_uninstall(
    paths: &StewardPaths,
    settings: &Settings,
    args: UninstallArgs,
) -> StewardResult<bool> {
    println!(
        "WARNING: This removes the installation at {}, its database, services and service account.",
        settings.app.install_root.display()
    );
    if args.delete_snapshots {
        println!(
            "All snapshots under {} will be deleted as well.",
            paths.snapshot_dir().display()
        );
    }
    if !confirm("Proceed with the uninstall?", args.force)? {
        println!("Aborted.");
        return Ok(true);
    }

    let host = Host::system(paths, settings, PathBuf::new(), prompt_for_missing());
    let report = Orchestrator::new(paths, settings, &host).uninstall(&UninstallOptions {
        final_snapshot: !args.no_final_snapshot,
        require_final_snapshot: args.require_final_snapshot,
        delete_snapshots: args.delete_snapshots,
    })?;

    println!("{}", format_uninstall_report(&report));
    let result = report.to_result();
    println!();
    println!("{}", format_lifecycle_result(&result));
    Ok(result.success)
}

pub fn handle_status(paths: &StewardPaths, settings: &Settings) -> StewardResult<bool> {
    let host = Host::system(paths, settings, PathBuf::new(), prompt_for_missing());
    let status = Orchestrator::new(paths, settings, &host).status()?;
    println!("{}", format_status(&status));
    Ok(true)
}
