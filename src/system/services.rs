//! The service set, driven through the service manager

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::runner::ToolRunner;
use crate::error::StewardResult;

/// Final state of one service as reported in lifecycle results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub active: bool,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.name,
            if self.active { "active" } else { "inactive" }
        )
    }
}

/// Operations on OS-managed services
pub trait ServiceManager {
    fn start(&self, name: &str) -> StewardResult<()>;

    /// Stopping a stopped service is not an error
    fn stop(&self, name: &str) -> StewardResult<()>;

    fn is_active(&self, name: &str) -> StewardResult<bool>;

    fn enable(&self, name: &str) -> StewardResult<()>;

    fn disable(&self, name: &str) -> StewardResult<()>;

    /// Delete the unit definition; an already absent unit is not an error
    fn remove_unit(&self, name: &str) -> StewardResult<()>;

    /// Current status of each named service
    fn statuses(&self, names: &[String]) -> Vec<ServiceStatus> {
        names
            .iter()
            .map(|name| ServiceStatus {
                name: name.clone(),
                active: self.is_active(name).unwrap_or(false),
            })
            .collect()
    }
}

/// `systemctl` backed implementation
#[derive(Debug, Clone)]
pub struct Systemctl {
    runner: ToolRunner,
    unit_dir: PathBuf,
}

impl Systemctl {
    pub fn new(runner: ToolRunner) -> Self {
        Self {
            runner,
            unit_dir: PathBuf::from("/etc/systemd/system"),
        }
    }

    fn systemctl(&self, verb: &str, name: &str) -> StewardResult<()> {
        self.runner
            .run("systemctl", Command::new("systemctl").arg(verb).arg(name))
    }
}

impl ServiceManager for Systemctl {
    fn start(&self, name: &str) -> StewardResult<()> {
        info!(service = name, "Starting service");
        self.systemctl("start", name)
    }

    fn stop(&self, name: &str) -> StewardResult<()> {
        info!(service = name, "Stopping service");
        // systemctl stop exits 0 for inactive units; unknown units exit 5
        if !self
            .runner
            .probe(Command::new("systemctl").args(["cat", name]))?
        {
            debug!(service = name, "Unit not loaded, nothing to stop");
            return Ok(());
        }
        self.systemctl("stop", name)
    }

    fn is_active(&self, name: &str) -> StewardResult<bool> {
        self.runner
            .probe(Command::new("systemctl").args(["is-active", "--quiet", name]))
    }

    fn enable(&self, name: &str) -> StewardResult<()> {
        self.systemctl("enable", name)
    }

    fn disable(&self, name: &str) -> StewardResult<()> {
        if !self
            .runner
            .probe(Command::new("systemctl").args(["cat", name]))?
        {
            return Ok(());
        }
        self.systemctl("disable", name)
    }

    fn remove_unit(&self, name: &str) -> StewardResult<()> {
        let path = self.unit_dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => info!(unit = %path.display(), "Removed unit file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(unit = %path.display(), "Unit file already absent")
            }
            Err(e) => return Err(e.into()),
        }
        self.runner
            .run("systemctl", Command::new("systemctl").arg("daemon-reload"))
    }
}
