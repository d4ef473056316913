//! Results reported by lifecycle operations

use std::fmt;

use serde::{Deserialize, Serialize};

use super::snapshot::SnapshotId;
use crate::error::StewardError;
use crate::system::ServiceStatus;

/// The four top-level lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Install,
    Update,
    Rollback,
    Uninstall,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Rollback => "rollback",
            Self::Uninstall => "uninstall",
        };
        f.write_str(name)
    }
}

/// Outcome of one lifecycle operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResult {
    pub operation: Operation,
    pub success: bool,
    /// Final state of every service in the service set
    pub services: Vec<ServiceStatus>,
    /// Snapshot an operator should restore from after a failure, or the
    /// snapshot the operation produced on success
    pub recovery_snapshot: Option<SnapshotId>,
    /// Step that failed, if any
    pub failed_step: Option<String>,
    pub message: String,
    /// The operation restored its own safety snapshot after failing
    pub auto_restored: bool,
}

impl LifecycleResult {
    pub fn succeeded(operation: Operation, message: impl Into<String>) -> Self {
        Self {
            operation,
            success: true,
            services: Vec::new(),
            recovery_snapshot: None,
            failed_step: None,
            message: message.into(),
            auto_restored: false,
        }
    }

    pub fn failed(operation: Operation, step: impl Into<String>, error: &StewardError) -> Self {
        Self {
            operation,
            success: false,
            services: Vec::new(),
            recovery_snapshot: error.recovery_snapshot().cloned(),
            failed_step: Some(step.into()),
            message: error.to_string(),
            auto_restored: false,
        }
    }

    pub fn with_services(mut self, services: Vec<ServiceStatus>) -> Self {
        self.services = services;
        self
    }

    pub fn with_snapshot(mut self, id: Option<SnapshotId>) -> Self {
        if id.is_some() {
            self.recovery_snapshot = id;
        }
        self
    }

    /// Every service ended up active
    pub fn all_active(&self) -> bool {
        self.services.iter().all(|s| s.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_carries_recovery() {
        let id = SnapshotId::parse("20260101-000000-000-pre-update").unwrap();
        let err = StewardError::Consistency {
            step: "migrate schema".into(),
            detail: "exit status: 1".into(),
            recovery: Some(id.clone()),
        };
        let result = LifecycleResult::failed(Operation::Update, "migrate schema", &err);
        assert!(!result.success);
        assert_eq!(result.recovery_snapshot, Some(id));
        assert_eq!(result.failed_step.as_deref(), Some("migrate schema"));
    }

    #[test]
    fn test_serialize_operation() {
        let result = LifecycleResult::succeeded(Operation::Rollback, "done");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["operation"], "rollback");
        assert_eq!(json["success"], true);
    }
}
