//! The managed installation
//!
//! Exactly one installation exists per host. Its tree root carries a small
//! release marker recording the installed version; the marker travels with
//! the tree through snapshots, so a restored tree reports the version it was
//! captured at.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::app_config::AppConfig;
use crate::config::Settings;
use crate::error::{StewardError, StewardResult};
use crate::storage::file_io::{read_json_required, write_json_atomic};
use crate::version::Version;

/// Name of the release marker in the tree root
pub const RELEASE_MARKER: &str = ".steward-release.json";

/// Contents of the release marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMarker {
    pub version: Version,
    pub installed_at: DateTime<Utc>,
}

/// Where the installation lives and what it is made of
#[derive(Debug, Clone)]
pub struct Installation {
    pub root: PathBuf,
    /// Absolute path of the application config file
    pub config_file: PathBuf,
    pub service_account: String,
    pub services: Vec<String>,
}

impl Installation {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            root: settings.app.install_root.clone(),
            config_file: settings.config_file(),
            service_account: settings.app.service_account.clone(),
            services: settings.app.services.clone(),
        }
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(RELEASE_MARKER)
    }

    /// A complete installation: tree with a release marker
    pub fn exists(&self) -> bool {
        self.marker_path().is_file()
    }

    /// Anything left on disk, complete or not
    pub fn has_remnants(&self) -> bool {
        self.root.exists()
    }

    pub fn read_marker(&self) -> StewardResult<ReleaseMarker> {
        if !self.exists() {
            return Err(StewardError::installation_not_found(&self.root));
        }
        read_json_required(self.marker_path())
    }

    pub fn installed_version(&self) -> StewardResult<Version> {
        Ok(self.read_marker()?.version)
    }

    pub fn write_marker(&self, version: &Version) -> StewardResult<()> {
        let marker = ReleaseMarker {
            version: version.clone(),
            installed_at: Utc::now(),
        };
        write_json_atomic(self.marker_path(), &marker)
    }

    pub fn load_config(&self) -> StewardResult<AppConfig> {
        AppConfig::load(&self.config_file)
    }

    /// File name of the config file, used inside snapshots
    pub fn config_file_name(&self) -> String {
        self.config_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "config".to_string())
    }

    /// Config file path relative to the tree root, if it lives inside the tree
    pub fn config_in_tree(&self) -> Option<&Path> {
        self.config_file.strip_prefix(&self.root).ok()
    }
}
