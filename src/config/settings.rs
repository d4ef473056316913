//! Operator settings for steward
//!
//! Describes the managed installation (where the tree lives, which services
//! and database belong to it) and the knobs of the lifecycle operations:
//! retention, archive exclusions, health polling and preflight checks.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::StewardPaths;
use crate::error::StewardError;
use crate::storage::file_io::{read_json_required, write_json_atomic};

/// The managed application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Short name used for logs and default identifiers
    pub name: String,
    /// Root of the application tree
    pub install_root: PathBuf,
    /// Location of the generated config file, relative to the tree root
    pub config_path: PathBuf,
    /// System account the application runs as
    pub service_account: String,
    /// Units making up the service set, in start order
    pub services: Vec<String>,
    /// Host names written into a freshly generated config
    pub allowed_hosts: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "webapp".to_string(),
            install_root: PathBuf::from("/opt/webapp"),
            config_path: PathBuf::from("config/settings.yaml"),
            service_account: "webapp".to_string(),
            services: vec!["webapp.service".to_string(), "webapp-worker.service".to_string()],
            allowed_hosts: vec!["localhost".to_string()],
        }
    }
}

/// Database defaults used when provisioning a new installation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    /// OS account allowed to administer the database server
    pub superuser_account: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            name: "webapp".to_string(),
            user: "webapp".to_string(),
            superuser_account: "postgres".to_string(),
        }
    }
}

/// Snapshot retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSettings {
    /// Number of snapshots to keep; 0 keeps everything
    pub keep_count: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self { keep_count: 5 }
    }
}

/// What goes into the tree archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSettings {
    /// Derived subtrees (relative to the tree root) left out of archives and
    /// left in place when the tree is replaced
    pub exclude: Vec<String>,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            exclude: vec![
                "venv".to_string(),
                ".venv".to_string(),
                "staticfiles".to_string(),
            ],
        }
    }
}

/// Post-start health verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// How many times to poll each service for "active"
    pub attempts: u32,
    /// Fixed delay between polls, in milliseconds
    pub interval_ms: u64,
    /// Advisory HTTP probe target
    pub probe_url: Option<String>,
    /// Probe request timeout, in seconds
    pub probe_timeout_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_ms: 3000,
            probe_url: Some("http://127.0.0.1/".to_string()),
            probe_timeout_secs: 10,
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Checks run before any mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightSettings {
    pub require_root: bool,
    /// Minimum free space on the install and snapshot filesystems, in MiB
    pub min_free_mb: u64,
    /// Accepted `/etc/os-release` ids; empty accepts any
    pub supported_os: Vec<String>,
}

impl Default for PreflightSettings {
    fn default() -> Self {
        Self {
            require_root: true,
            min_free_mb: 2048,
            supported_os: vec!["rhel".to_string(), "rocky".to_string(), "almalinux".to_string()],
        }
    }
}

/// Commands run inside the application tree as the service account
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Installs or upgrades dependencies; `{deps}` expands to the release's
    /// dependency directory
    pub dependencies: Vec<String>,
    /// Applies schema migrations
    pub migrate: Vec<String>,
    /// Rebuilds the derived subtrees of a restored tree, in order
    pub rebuild: Vec<Vec<String>>,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            dependencies: vec![
                "venv/bin/pip".to_string(),
                "install".to_string(),
                "--no-index".to_string(),
                "--find-links".to_string(),
                "{deps}".to_string(),
                "-r".to_string(),
                "requirements.txt".to_string(),
            ],
            migrate: vec![
                "venv/bin/python".to_string(),
                "manage.py".to_string(),
                "migrate".to_string(),
                "--noinput".to_string(),
            ],
            rebuild: vec![
                vec![
                    "python3".to_string(),
                    "-m".to_string(),
                    "venv".to_string(),
                    "venv".to_string(),
                ],
                vec![
                    "venv/bin/pip".to_string(),
                    "install".to_string(),
                    "-r".to_string(),
                    "requirements.txt".to_string(),
                ],
                vec![
                    "venv/bin/python".to_string(),
                    "manage.py".to_string(),
                    "collectstatic".to_string(),
                    "--noinput".to_string(),
                ],
            ],
        }
    }
}

/// Ownership and labelling rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardeningSettings {
    /// Run `restorecon` over the tree after permissions are applied
    pub selinux_relabel: bool,
    /// Paths (relative to the tree root) the service account may write to
    pub writable: Vec<String>,
}

impl Default for HardeningSettings {
    fn default() -> Self {
        Self {
            selinux_relabel: true,
            writable: vec!["media".to_string(), "logs".to_string()],
        }
    }
}

/// Settings for steward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub app: AppSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retention: RetentionSettings,

    #[serde(default)]
    pub archive: ArchiveSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub preflight: PreflightSettings,

    #[serde(default)]
    pub commands: CommandSettings,

    #[serde(default)]
    pub hardening: HardeningSettings,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            app: AppSettings::default(),
            database: DatabaseSettings::default(),
            retention: RetentionSettings::default(),
            archive: ArchiveSettings::default(),
            health: HealthSettings::default(),
            preflight: PreflightSettings::default(),
            commands: CommandSettings::default(),
            hardening: HardeningSettings::default(),
        }
    }
}

impl Settings {
    /// Absolute path of the application config file
    pub fn config_file(&self) -> PathBuf {
        self.app.install_root.join(&self.app.config_path)
    }

    /// Load settings from disk, or fall back to defaults if the file doesn't exist
    pub fn load_or_create(paths: &StewardPaths) -> Result<Self, StewardError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            // Don't save yet - let caller decide when to persist
            return Ok(Settings::default());
        }

        let settings: Settings = read_json_required(&settings_path).map_err(|e| {
            StewardError::Config(format!("Failed to parse settings file: {}", e))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &StewardPaths) -> Result<(), StewardError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    /// Reject settings no operation could run with
    pub fn validate(&self) -> Result<(), StewardError> {
        if !self.app.install_root.is_absolute() {
            return Err(StewardError::Config(format!(
                "install_root must be absolute: {}",
                self.app.install_root.display()
            )));
        }
        if self.app.config_path.is_absolute() {
            return Err(StewardError::Config(
                "config_path must be relative to install_root".into(),
            ));
        }
        if self.app.services.is_empty() {
            return Err(StewardError::Config("No services configured".into()));
        }
        if self.health.attempts == 0 {
            return Err(StewardError::Config("health.attempts must be at least 1".into()));
        }
        Ok(())
    }
}
