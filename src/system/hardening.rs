//! Ownership, permission and label rules for the application tree
//!
//! Callers treat every failure here as a warning: a tree with imperfect
//! permissions is still a working installation.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use nix::unistd::{chown, Gid, Uid};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::accounts::ServiceAccount;
use super::runner::ToolRunner;
use crate::error::StewardResult;

/// Applies security rules to an installed tree
pub trait Hardener {
    fn harden(&self, root: &Path, account: &ServiceAccount) -> StewardResult<()>;
}

/// Root-owned, group-readable tree with a few account-writable paths
#[derive(Debug, Clone)]
pub struct FilesystemHardener {
    writable: Vec<String>,
    selinux_relabel: bool,
    runner: ToolRunner,
}

impl FilesystemHardener {
    pub fn new(writable: Vec<String>, selinux_relabel: bool, runner: ToolRunner) -> Self {
        Self {
            writable,
            selinux_relabel,
            runner,
        }
    }

    fn is_writable(&self, rel: &Path) -> bool {
        self.writable.iter().any(|w| rel.starts_with(w))
    }
}

/// Mode for an entry: directories and executables keep their execute bit
fn hardened_mode(current: u32, is_dir: bool, writable: bool) -> u32 {
    let executable = is_dir || current & 0o111 != 0;
    match (executable, writable) {
        (true, true) => 0o770,
        (true, false) => 0o750,
        (false, true) => 0o660,
        (false, false) => 0o640,
    }
}

impl Hardener for FilesystemHardener {
    fn harden(&self, root: &Path, account: &ServiceAccount) -> StewardResult<()> {
        info!(root = %root.display(), account = %account.name, "Applying tree permissions");
        let privileged = Uid::effective().is_root();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            if entry.path_is_symlink() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let writable = self.is_writable(rel);
            let metadata = entry.metadata()?;

            if privileged {
                let owner = if writable { account.uid } else { 0 };
                chown(
                    entry.path(),
                    Some(Uid::from_raw(owner)),
                    Some(Gid::from_raw(account.gid)),
                )?;
            }

            let mode = hardened_mode(
                metadata.permissions().mode(),
                metadata.is_dir(),
                writable,
            );
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode))?;
        }

        if self.selinux_relabel {
            self.runner.run(
                "restorecon",
                Command::new("restorecon").arg("-R").arg(root),
            )?;
        } else {
            debug!("SELinux relabel disabled");
        }
        Ok(())
    }
}
