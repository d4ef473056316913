//! CLI command handlers
//!
//! Bridges clap argument parsing with the lifecycle and snapshot layers.
//! Handlers return `Ok(false)` when an operation ran but did not succeed, so
//! the binary can exit non-zero after the report has been printed.

pub mod config;
pub mod lifecycle;
pub mod snapshot;

use std::io::{self, BufRead, Write};

pub use config::{handle_config_command, ConfigCommands};
pub use lifecycle::{
    handle_install, handle_rollback, handle_status, handle_uninstall, handle_update, InstallArgs,
    RollbackArgs, UninstallArgs, UpdateArgs,
};
pub use snapshot::{handle_snapshot_command, SnapshotCommands};

use crate::error::StewardResult;

/// Ask the operator to type `yes`, unless `assume_yes` was given
///
/// A closed stdin counts as a refusal.
pub fn confirm(prompt: &str, assume_yes: bool) -> StewardResult<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{} (yes/no): ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    let read = io::stdin().lock().read_line(&mut answer)?;
    if read == 0 {
        println!();
        return Ok(false);
    }
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
