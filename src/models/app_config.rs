//! The application's generated configuration file
//!
//! The file is written by the install step as a typed YAML record and read
//! back the same way, so database credentials are recovered structurally
//! instead of being scraped out of rendered text.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StewardError, StewardResult};

/// Database connection section of the application config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    /// Absent when the operator keeps the password out of the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5432
}

/// The application configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseSection,

    /// Application signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_hosts: Vec<String>,

    /// Settings owned by the application that steward carries through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl AppConfig {
    /// Load the config file, failing if it is missing or unparseable
    pub fn load(path: &Path) -> StewardResult<Self> {
        if !path.exists() {
            return Err(StewardError::Precondition(format!(
                "Application config not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            StewardError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            StewardError::Config(format!(
                "Failed to parse database settings from {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the config file with owner/group-only permissions
    pub fn save(&self, path: &Path) -> StewardResult<()> {
        use std::os::unix::fs::OpenOptionsExt;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        let temp_path = path.with_extension("yaml.tmp");

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o640)
            .open(&temp_path)
            .map_err(|e| StewardError::Io(format!("Failed to create config file: {}", e)))?;
        file.write_all(yaml.as_bytes())?;
        file.sync_all()?;

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StewardError::Io(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> AppConfig {
        AppConfig {
            database: DatabaseSection {
                host: "localhost".into(),
                port: 5432,
                name: "webapp".into(),
                user: "webapp".into(),
                password: Some("S3cure!Passw0rd".into()),
            },
            secret_key: Some("c2lnbmluZw".into()),
            allowed_hosts: vec!["app.example.org".into()],
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config").join("settings.yaml");

        sample().save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_saved_file_is_not_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        sample().save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o007, 0);
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        fs::write(
            &path,
            "database:\n  name: webapp\n  user: webapp\ntime_zone: UTC\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.database.host, "127.0.0.1");
        assert_eq!(config.database.port, 5432);
        assert!(config.database.password.is_none());
        assert_eq!(
            config.extra.get("time_zone"),
            Some(&serde_yaml::Value::String("UTC".into()))
        );
    }

    #[test]
    fn test_missing_database_section_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        fs::write(&path, "secret_key: abc\n").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, StewardError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_precondition_error() {
        let temp = TempDir::new().unwrap();
        let err = AppConfig::load(&temp.path().join("nope.yaml")).unwrap_err();
        assert!(err.is_precondition());
    }
}
