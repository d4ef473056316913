//! Path management for steward's own state
//!
//! Everything steward owns (settings, snapshots, tool logs, staging area,
//! the lifecycle lock) lives under one state directory. The application
//! tree itself lives wherever `Settings::app.install_root` points.
//!
//! ## Path Resolution Order
//!
//! 1. `STEWARD_HOME` environment variable (if set)
//! 2. `/var/lib/steward`

use std::path::PathBuf;

use crate::error::StewardError;

/// Default state directory
pub const DEFAULT_STATE_DIR: &str = "/var/lib/steward";

/// Manages all paths used by steward
#[derive(Debug, Clone)]
pub struct StewardPaths {
    /// Base directory for all steward state
    base_dir: PathBuf,
}

impl StewardPaths {
    /// Resolve the state directory from the environment
    pub fn new() -> Self {
        let base_dir = std::env::var_os("STEWARD_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        Self { base_dir }
    }

    /// Create StewardPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Settings file (`<state>/config.json`)
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Root of all snapshot directories
    pub fn snapshot_dir(&self) -> PathBuf {
        self.base_dir.join("snapshots")
    }

    /// Directory for external tool output
    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Scratch space for files that must survive a tree replacement
    pub fn staging_dir(&self) -> PathBuf {
        self.base_dir.join("staging")
    }

    /// Advisory lock serializing lifecycle operations
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("lifecycle.lock")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), StewardError> {
        for (dir, what) in [
            (self.base_dir.clone(), "state"),
            (self.snapshot_dir(), "snapshot"),
            (self.log_dir(), "log"),
            (self.staging_dir(), "staging"),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                StewardError::Io(format!("Failed to create {} directory: {}", what, e))
            })?;
        }
        Ok(())
    }
}

impl Default for StewardPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StewardPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.snapshot_dir(), temp_dir.path().join("snapshots"));
        assert_eq!(paths.lock_file(), temp_dir.path().join("lifecycle.lock"));
        assert_eq!(paths.settings_file(), temp_dir.path().join("config.json"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = StewardPaths::with_base_dir(temp_dir.path().join("state"));

        paths.ensure_directories().unwrap();

        assert!(paths.snapshot_dir().exists());
        assert!(paths.log_dir().exists());
        assert!(paths.staging_dir().exists());
    }
}
