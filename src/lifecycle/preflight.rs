//! Checks that run before any mutation
//!
//! Every failure here is a precondition error: nothing on the host has been
//! touched yet.

use std::fs;
use std::path::Path;

use nix::sys::statvfs::statvfs;
use nix::unistd::Uid;
use tracing::{debug, info};

use crate::config::settings::PreflightSettings;
use crate::error::{StewardError, StewardResult};

/// Location of the OS identification file
pub const OS_RELEASE: &str = "/etc/os-release";

/// Runs the configured host checks
pub struct Preflight<'a> {
    settings: &'a PreflightSettings,
    os_release: &'a Path,
}

impl<'a> Preflight<'a> {
    pub fn new(settings: &'a PreflightSettings) -> Self {
        Self {
            settings,
            os_release: Path::new(OS_RELEASE),
        }
    }

    /// Read OS identification from another file
    pub fn with_os_release(mut self, path: &'a Path) -> Self {
        self.os_release = path;
        self
    }

    pub fn check_privileges(&self) -> StewardResult<()> {
        if self.settings.require_root && !Uid::effective().is_root() {
            return Err(StewardError::Precondition(
                "This operation must be run as root".into(),
            ));
        }
        Ok(())
    }

    /// Match `/etc/os-release` ID and ID_LIKE against the supported ids
    pub fn check_os(&self) -> StewardResult<()> {
        if self.settings.supported_os.is_empty() {
            return Ok(());
        }
        let contents = fs::read_to_string(self.os_release).map_err(|e| {
            StewardError::Precondition(format!(
                "Cannot identify the operating system ({}): {}",
                self.os_release.display(),
                e
            ))
        })?;

        let ids = os_ids(&contents);
        if ids
            .iter()
            .any(|id| self.settings.supported_os.iter().any(|s| s == id))
        {
            debug!(?ids, "Operating system supported");
            Ok(())
        } else {
            Err(StewardError::Precondition(format!(
                "Unsupported operating system '{}' (supported: {})",
                ids.first().map(String::as_str).unwrap_or("unknown"),
                self.settings.supported_os.join(", ")
            )))
        }
    }

    /// Require `min_free_mb` on the filesystem that will hold `path`
    pub fn check_free_space(&self, path: &Path) -> StewardResult<()> {
        if self.settings.min_free_mb == 0 {
            return Ok(());
        }
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("/"));
        let stats = statvfs(existing)?;
        let free_mb = (stats.blocks_available() as u64)
            .saturating_mul(stats.fragment_size() as u64)
            / (1024 * 1024);

        if free_mb < self.settings.min_free_mb {
            return Err(StewardError::Precondition(format!(
                "Insufficient disk space at {}: {} MiB free, {} MiB required",
                existing.display(),
                free_mb,
                self.settings.min_free_mb
            )));
        }
        info!(path = %existing.display(), free_mb, "Disk space sufficient");
        Ok(())
    }

    /// Privileges, OS and free space for every path given
    pub fn run(&self, paths: &[&Path]) -> StewardResult<()> {
        self.check_privileges()?;
        self.check_os()?;
        for path in paths {
            self.check_free_space(path)?;
        }
        Ok(())
    }
}

/// `ID` followed by every `ID_LIKE` entry, unquoted and lower-cased
fn os_ids(os_release: &str) -> Vec<String> {
    let mut id = Vec::new();
    let mut like = Vec::new();
    for line in os_release.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim() {
            "ID" => id.push(value.to_lowercase()),
            "ID_LIKE" => like.extend(value.split_whitespace().map(str::to_lowercase)),
            _ => {}
        }
    }
    id.extend(like);
    id
}
