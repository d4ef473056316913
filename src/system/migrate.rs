//! Schema migrations

use std::path::Path;
use std::process::Command;

use tracing::info;

use super::accounts::ServiceAccount;
use super::runner::{as_account, ToolRunner};
use crate::error::StewardResult;

/// Applies the application's schema migrations
pub trait SchemaMigrator {
    fn migrate(&self, root: &Path, account: &ServiceAccount) -> StewardResult<()>;
}

/// Runs a configured command inside the tree as the service account
#[derive(Debug, Clone)]
pub struct CommandMigrator {
    command: Vec<String>,
    runner: ToolRunner,
}

impl CommandMigrator {
    pub fn new(command: Vec<String>, runner: ToolRunner) -> Self {
        Self { command, runner }
    }
}

impl SchemaMigrator for CommandMigrator {
    fn migrate(&self, root: &Path, account: &ServiceAccount) -> StewardResult<()> {
        let Some((program, args)) = self.command.split_first() else {
            info!("No migration command configured");
            return Ok(());
        };

        let mut cmd = Command::new(program);
        cmd.current_dir(root).args(args);
        as_account(&mut cmd, account);

        info!(root = %root.display(), "Applying schema migrations");
        self.runner.run("migrate", &mut cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_runs_in_tree_root() {
        let temp = TempDir::new().unwrap();
        let me = ServiceAccount::current().unwrap();
        let migrator = CommandMigrator::new(
            vec!["sh".into(), "-c".into(), "touch migrated".into()],
            ToolRunner::new(temp.path().join("logs")),
        );

        migrator.migrate(temp.path(), &me).unwrap();
        assert!(temp.path().join("migrated").exists());
    }

    #[test]
    fn test_failure_surfaces_tool_error() {
        let temp = TempDir::new().unwrap();
        let me = ServiceAccount::current().unwrap();
        let migrator = CommandMigrator::new(
            vec!["sh".into(), "-c".into(), "exit 4".into()],
            ToolRunner::new(temp.path().join("logs")),
        );

        let err = migrator.migrate(temp.path(), &me).unwrap_err();
        assert!(matches!(err, crate::error::StewardError::Tool { .. }));
    }
}
