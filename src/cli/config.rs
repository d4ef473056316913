//! Settings CLI commands

use clap::Subcommand;

use crate::config::{Settings, StewardPaths};
use crate::error::{StewardError, StewardResult};

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective settings and state paths
    Show,

    /// Write the default settings file
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a config command
pub fn handle_config_command(
    paths: &StewardPaths,
    settings: &Settings,
    cmd: ConfigCommands,
) -> StewardResult<bool> {
    match cmd {
        ConfigCommands::Show => {
            println!("steward configuration");
            println!("=====================");
            println!("State directory:  {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Snapshots:        {}", paths.snapshot_dir().display());
            println!("Tool logs:        {}", paths.log_dir().display());
            println!();
            let json = serde_json::to_string_pretty(settings)?;
            println!("{}", json);
        }

        ConfigCommands::Init { force } => {
            let file = paths.settings_file();
            if file.exists() && !force {
                return Err(StewardError::Precondition(format!(
                    "{} already exists; use --force to overwrite it",
                    file.display()
                )));
            }
            Settings::default().save(paths)?;
            println!("Default settings written to {}", file.display());
            println!("Edit it to describe the managed installation before running install.");
        }
    }
    Ok(true)
}
