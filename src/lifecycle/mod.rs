//! Lifecycle operations
//!
//! - `orchestrator`: install, update, rollback and uninstall
//! - `preflight`: host checks that run before anything is changed
//! - `health`: service start/stop and bounded readiness polling
//! - `lock`: one lifecycle operation per installation at a time
//! - `signals`: interrupts held off across destructive steps

pub mod health;
pub mod lock;
pub mod orchestrator;
pub mod preflight;
pub mod signals;

pub use lock::InstallationLock;
pub use orchestrator::{
    InstallRequest, InstallationStatus, Orchestrator, UninstallOptions, UninstallReport,
    UninstallStep, UpdateRequest, MANUAL_RECOVERY_NOTICE,
};
pub use preflight::Preflight;
pub use signals::InterruptGuard;
