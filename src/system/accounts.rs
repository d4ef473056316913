//! The application's system account

use std::path::{Path, PathBuf};
use std::process::Command;

use nix::unistd::User;
use tracing::info;

use super::runner::ToolRunner;
use crate::error::{StewardError, StewardResult};

/// A resolved system account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccount {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl ServiceAccount {
    /// Look up an account in the system user database
    pub fn lookup(name: &str) -> StewardResult<Option<Self>> {
        Ok(User::from_name(name)?.map(|user| Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        }))
    }

    /// The account steward itself runs as
    pub fn current() -> StewardResult<Self> {
        let uid = nix::unistd::Uid::effective();
        let user = User::from_uid(uid)?
            .ok_or_else(|| StewardError::Config(format!("No passwd entry for uid {}", uid)))?;
        Ok(Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        })
    }
}

/// Creates, resolves and removes the service account
pub trait ServiceAccounts {
    /// Resolve the account, `None` if it does not exist
    fn lookup(&self, name: &str) -> StewardResult<Option<ServiceAccount>>;

    /// Create the account if missing and return it
    fn ensure(&self, name: &str, home: &Path) -> StewardResult<ServiceAccount>;

    /// Delete the account; absent accounts are not an error
    fn remove(&self, name: &str) -> StewardResult<()>;

    /// Resolve the account or fail with a precondition error
    fn require(&self, name: &str) -> StewardResult<ServiceAccount> {
        self.lookup(name)?.ok_or_else(|| {
            StewardError::Precondition(format!("Service account '{}' does not exist", name))
        })
    }
}

/// `useradd`/`userdel` backed implementation
#[derive(Debug, Clone)]
pub struct SystemAccounts {
    runner: ToolRunner,
}

impl SystemAccounts {
    pub fn new(runner: ToolRunner) -> Self {
        Self { runner }
    }
}

impl ServiceAccounts for SystemAccounts {
    fn lookup(&self, name: &str) -> StewardResult<Option<ServiceAccount>> {
        ServiceAccount::lookup(name)
    }

    fn ensure(&self, name: &str, home: &Path) -> StewardResult<ServiceAccount> {
        if let Some(account) = ServiceAccount::lookup(name)? {
            return Ok(account);
        }

        info!(account = name, "Creating service account");
        self.runner.run(
            "useradd",
            Command::new("useradd")
                .arg("--system")
                .arg("--user-group")
                .arg("--no-create-home")
                .arg("--home-dir")
                .arg(home)
                .arg("--shell")
                .arg("/sbin/nologin")
                .arg(name),
        )?;

        self.require(name)
    }

    fn remove(&self, name: &str) -> StewardResult<()> {
        if ServiceAccount::lookup(name)?.is_none() {
            info!(account = name, "Service account already absent");
            return Ok(());
        }
        self.runner.run("userdel", Command::new("userdel").arg(name))
    }
}
