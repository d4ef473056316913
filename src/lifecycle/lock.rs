//! Exclusive lifecycle lock
//!
//! At most one lifecycle operation may run against the installation at a
//! time. The lock is an advisory `flock` on a file in steward's state
//! directory; the kernel drops it when the holder exits, so a crashed run
//! never leaves a stale lock behind.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{StewardError, StewardResult};

/// Held for the duration of one lifecycle operation; released on drop
#[derive(Debug)]
pub struct InstallationLock {
    path: PathBuf,
    _file: Flock<fs::File>,
}

impl InstallationLock {
    /// Take the lock or fail immediately if another operation holds it
    pub fn acquire(path: &Path, installation_root: &Path) -> StewardResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                StewardError::Io(format!("Failed to open lock file {}: {}", path.display(), e))
            })?;

        let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(StewardError::OperationInProgress(path.to_path_buf()))
            }
            Err((_, errno)) => {
                return Err(StewardError::Io(format!(
                    "Failed to lock {}: {}",
                    path.display(),
                    errno
                )))
            }
        };

        locked.set_len(0)?;
        writeln!(
            locked,
            "pid={} root={}",
            std::process::id(),
            installation_root.display()
        )?;
        debug!(lock = %path.display(), "Lifecycle lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
            _file: locked,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallationLock {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "Lifecycle lock released");
    }
}
