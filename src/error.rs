//! Custom error types for steward
//!
//! The variants follow the failure taxonomy the lifecycle operations report:
//! precondition errors (nothing was changed), external tool failures (the
//! tool's output lives in a log file), consistency failures (a recovery
//! snapshot exists), and the usual plumbing errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::backup::RestoreFailure;
use crate::models::SnapshotId;

/// The main error type for steward operations
#[derive(Error, Debug)]
pub enum StewardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// YAML (application config file) errors
    #[error("YAML error: {0}")]
    Yaml(String),

    /// A check that runs before any mutation failed
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Another lifecycle operation holds the installation lock
    #[error("Another lifecycle operation is already in progress (lock: {})", .0.display())]
    OperationInProgress(PathBuf),

    /// An external tool exited unsuccessfully
    #[error("{tool} failed ({status}); see {}", log.display())]
    Tool {
        tool: String,
        status: String,
        log: PathBuf,
    },

    /// A step left the installation in a state that needs recovery
    #[error("{step} failed: {detail}{}", recovery_hint(.recovery))]
    Consistency {
        step: String,
        detail: String,
        recovery: Option<SnapshotId>,
    },

    /// Restoring a snapshot failed
    #[error(transparent)]
    Restore(#[from] RestoreFailure),

    /// Archive creation or extraction errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Credential collection or generation errors
    #[error("Credential error: {0}")]
    Credential(String),

    /// Version strings that cannot be compared
    #[error("Invalid version: {0}")]
    Version(String),
}

fn recovery_hint(recovery: &Option<SnapshotId>) -> String {
    match recovery {
        Some(id) => format!(" (recover with snapshot {})", id),
        None => String::new(),
    }
}

impl StewardError {
    /// Create a "not found" error for snapshots
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Snapshot",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for the installation
    pub fn installation_not_found(root: &std::path::Path) -> Self {
        Self::NotFound {
            entity_type: "Installation",
            identifier: root.display().to_string(),
        }
    }

    /// Create a tool failure from a process exit status
    pub fn tool(tool: impl Into<String>, status: impl ToString, log: PathBuf) -> Self {
        Self::Tool {
            tool: tool.into(),
            status: status.to_string(),
            log,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors raised before anything on the host was touched
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Precondition(_)
                | Self::NotFound { .. }
                | Self::OperationInProgress(_)
                | Self::Version(_)
        )
    }

    /// The snapshot an operator should restore from, if this error carries one
    pub fn recovery_snapshot(&self) -> Option<&SnapshotId> {
        match self {
            Self::Consistency { recovery, .. } => recovery.as_ref(),
            Self::Restore(failure) => failure.recovery.as_ref(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StewardError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StewardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<serde_yaml::Error> for StewardError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

impl From<nix::Error> for StewardError {
    fn from(err: nix::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<walkdir::Error> for StewardError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for steward operations
pub type StewardResult<T> = Result<T, StewardError>;
