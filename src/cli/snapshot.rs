//! Snapshot CLI commands

use std::path::PathBuf;

use clap::Subcommand;

use super::confirm;
use crate::backup::{verify_snapshot, SnapshotStore};
use crate::config::{Settings, StewardPaths};
use crate::credentials::PromptCredentials;
use crate::display::{format_retention_plan, format_snapshot_details, format_snapshot_list};
use crate::error::StewardResult;
use crate::lifecycle::Orchestrator;
use crate::models::SnapshotKind;
use crate::system::Host;

/// Snapshot subcommands
#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Capture config, database and tree now
    Create,

    /// List complete snapshots, newest first
    List,

    /// Show one snapshot and check its payloads
    Info {
        /// Snapshot id, or 'latest'
        snapshot: String,
    },

    /// Re-hash payloads against recorded checksums
    Verify {
        /// Snapshot id, or 'latest'; every snapshot when omitted
        snapshot: Option<String>,
    },

    /// Delete snapshots beyond the retention count
    Prune {
        /// Apply the deletions instead of listing them
        #[arg(short, long)]
        force: bool,
    },

    /// Remove working directories of aborted snapshots
    Gc {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a snapshot command
pub fn handle_snapshot_command(
    paths: &StewardPaths,
    settings: &Settings,
    cmd: SnapshotCommands,
) -> StewardResult<bool> {
    let store = SnapshotStore::new(paths.snapshot_dir());

    match cmd {
        SnapshotCommands::Create => {
            let host = Host::system(
                paths,
                settings,
                PathBuf::new(),
                Box::new(PromptCredentials { confirm: false }),
            );
            println!("Creating snapshot...");
            let outcome = Orchestrator::new(paths, settings, &host).snapshot(SnapshotKind::Manual)?;
            println!("Snapshot created: {}", outcome.id);
            println!("Location: {}", store.snapshot_path(&outcome.id).display());
            if !outcome.pruned.is_empty() {
                println!("Pruned by retention:");
                for id in &outcome.pruned {
                    println!("  - {}", id);
                }
            }
        }

        SnapshotCommands::List => {
            let snapshots = store.list()?;
            println!("{}", format_snapshot_list(&snapshots, chrono::Utc::now()));
            if snapshots.is_empty() {
                println!("Create one with: steward snapshot create");
            }
        }

        SnapshotCommands::Info { snapshot } => {
            let info = store.resolve(&snapshot)?;
            let report = verify_snapshot(&info);
            println!("{}", format_snapshot_details(&info, &report));
            return Ok(report.is_ok());
        }

        SnapshotCommands::Verify { snapshot } => {
            let targets = match snapshot {
                Some(reference) => vec![store.resolve(&reference)?],
                None => store.list()?,
            };
            if targets.is_empty() {
                println!("No snapshots found.");
                return Ok(true);
            }

            let mut all_ok = true;
            for info in &targets {
                let report = verify_snapshot(info);
                if report.is_ok() {
                    println!("{}: OK", report.id);
                } else {
                    all_ok = false;
                    println!("{}: FAILED", report.id);
                    for problem in &report.problems {
                        println!("  - {}", problem);
                    }
                }
            }
            return Ok(all_ok);
        }

        SnapshotCommands::Prune { force } => {
            let host = Host::system(
                paths,
                settings,
                PathBuf::new(),
                Box::new(PromptCredentials { confirm: false }),
            );
            let orchestrator = Orchestrator::new(paths, settings, &host);
            if settings.retention.keep_count == 0 {
                println!("Retention is unlimited (keep_count = 0); nothing is pruned.");
                return Ok(true);
            }
            println!("Retention policy: keep {}", settings.retention.keep_count);

            let plan = orchestrator.prune(!force)?;
            println!("{}", format_retention_plan(&plan, force));
            if !force && !plan.delete.is_empty() {
                println!();
                println!("To delete them, run again with --force flag:");
                println!("  steward snapshot prune --force");
            }
        }

        SnapshotCommands::Gc { force } => {
            let partials = store.partials()?;
            if partials.is_empty() {
                println!("No abandoned snapshot directories.");
                return Ok(true);
            }
            for path in &partials {
                println!("  {}", path.display());
            }
            if !confirm(
                &format!("Delete {} abandoned director(ies)?", partials.len()),
                force,
            )? {
                println!("Aborted.");
                return Ok(true);
            }

            let host = Host::system(
                paths,
                settings,
                PathBuf::new(),
                Box::new(PromptCredentials { confirm: false }),
            );
            let removed = Orchestrator::new(paths, settings, &host).collect_garbage()?;
            println!("Removed {} director(ies).", removed.len());
        }
    }

    Ok(true)
}
