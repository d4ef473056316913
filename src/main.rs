use anyhow::Result;
use clap::{Parser, Subcommand};

use steward::cli::{
    handle_config_command, handle_install, handle_rollback, handle_snapshot_command,
    handle_status, handle_uninstall, handle_update, ConfigCommands, InstallArgs, RollbackArgs,
    SnapshotCommands, UninstallArgs, UpdateArgs,
};
use steward::config::{Settings, StewardPaths};

#[derive(Parser)]
#[command(
    name = "steward",
    version,
    about = "Install, update, back up and roll back a stateful application stack",
    long_about = "steward manages one installation of a web application made of an \
                  application tree, a PostgreSQL database and a generated config file. \
                  Every update and rollback is preceded by a snapshot, and a failed \
                  update restores the previous state where that is safe."
)]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info", env = "STEWARD_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the application from a release bundle
    Install(InstallArgs),

    /// Update the installation from a release bundle
    Update(UpdateArgs),

    /// Restore a snapshot over the installation
    Rollback(RollbackArgs),

    /// Remove the installation
    Uninstall(UninstallArgs),

    /// Show installed version, services and snapshots
    Status,

    /// Snapshot management commands
    #[command(subcommand)]
    Snapshot(SnapshotCommands),

    /// Settings commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    steward::logging::init(&cli.log_level)?;

    let paths = StewardPaths::new();
    let settings = Settings::load_or_create(&paths)?;

    let succeeded = match cli.command {
        Commands::Install(args) => handle_install(&paths, &settings, args)?,
        Commands::Update(args) => handle_update(&paths, &settings, args)?,
        Commands::Rollback(args) => handle_rollback(&paths, &settings, args)?,
        Commands::Uninstall(args) => handle_uninstall(&paths, &settings, args)?,
        Commands::Status => handle_status(&paths, &settings)?,
        Commands::Snapshot(cmd) => handle_snapshot_command(&paths, &settings, cmd)?,
        Commands::Config(cmd) => handle_config_command(&paths, &settings, cmd)?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
