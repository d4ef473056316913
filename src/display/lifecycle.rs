//! Lifecycle result formatting

use crate::lifecycle::{InstallationStatus, UninstallReport, MANUAL_RECOVERY_NOTICE};
use crate::models::{LifecycleResult, Operation};
use crate::system::ServiceStatus;

fn format_services(services: &[ServiceStatus]) -> String {
    let mut output = String::new();
    for service in services {
        let state = if service.active { "active" } else { "INACTIVE" };
        output.push_str(&format!("\n  {:<32} {}", service.name, state));
    }
    output
}

/// Format the outcome of install, update, rollback or uninstall
pub fn format_lifecycle_result(result: &LifecycleResult) -> String {
    let mut output = if result.success {
        format!("{} succeeded: {}", result.operation, result.message)
    } else {
        format!(
            "{} FAILED at step '{}': {}",
            result.operation,
            result.failed_step.as_deref().unwrap_or("unknown"),
            result.message
        )
    };

    if !result.services.is_empty() {
        output.push_str("\n\nServices:");
        output.push_str(&format_services(&result.services));
    }

    if let Some(id) = &result.recovery_snapshot {
        if result.success {
            output.push_str(&format!("\n\nSnapshot: {}", id));
        } else if result.auto_restored {
            output.push_str(&format!(
                "\n\nThe previous state was restored automatically from snapshot {}.",
                id
            ));
        } else {
            output.push_str(&format!("\n\nRecovery snapshot: {}", id));
            output.push_str(&format!("\nTo restore it: steward rollback {}", id));
        }
    }

    if !result.success
        && !result.auto_restored
        && result.operation == Operation::Update
        && !result.message.contains(MANUAL_RECOVERY_NOTICE)
    {
        output.push_str(&format!("\n\nWARNING: {}", MANUAL_RECOVERY_NOTICE));
    }
    output
}

/// Format the per-step account of an uninstall
pub fn format_uninstall_report(report: &UninstallReport) -> String {
    let mut output = String::from("Uninstall steps:");
    for step in &report.steps {
        match (&step.ok, &step.detail) {
            (true, _) => output.push_str(&format!("\n  [ok]     {}", step.step)),
            (false, Some(detail)) => {
                output.push_str(&format!("\n  [failed] {}: {}", step.step, detail))
            }
            (false, None) => output.push_str(&format!("\n  [failed] {}", step.step)),
        }
    }

    if let Some(id) = &report.final_snapshot {
        output.push_str(&format!("\n\nFinal snapshot: {}", id));
    }
    if report.deleted_snapshots.is_empty() {
        output.push_str("\nSnapshots were kept.");
    } else {
        output.push_str(&format!(
            "\nDeleted {} snapshot(s).",
            report.deleted_snapshots.len()
        ));
    }
    output
}

/// Format `steward status`
pub fn format_status(status: &InstallationStatus) -> String {
    let mut output = String::new();
    output.push_str(&format!("Installation: {}\n", status.root.display()));
    match (&status.installed, &status.version) {
        (true, Some(version)) => output.push_str(&format!("Version:      {}\n", version)),
        _ => output.push_str("Version:      not installed\n"),
    }
    output.push_str(&format!("Snapshots:    {}", status.snapshots));
    if let Some(id) = &status.latest_snapshot {
        output.push_str(&format!(" (latest {})", id));
    }
    if status.abandoned_partials > 0 {
        output.push_str(&format!(
            "\nAbandoned:    {} incomplete snapshot(s); run 'steward snapshot gc'",
            status.abandoned_partials
        ));
    }
    if !status.services.is_empty() {
        output.push_str("\n\nServices:");
        output.push_str(&format_services(&status.services));
    }
    output
}
