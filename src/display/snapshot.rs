//! Snapshot display formatting

use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::format_size;
use crate::backup::{RetentionPlan, VerifyReport};
use crate::models::SnapshotInfo;

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Protected")]
    protected: &'static str,
}

/// Format snapshots, newest first, as a table
pub fn format_snapshot_list(snapshots: &[SnapshotInfo], now: DateTime<Utc>) -> String {
    if snapshots.is_empty() {
        return "No snapshots found.".to_string();
    }

    let rows: Vec<SnapshotRow> = snapshots
        .iter()
        .map(|s| SnapshotRow {
            id: s.id().to_string(),
            kind: s.kind().to_string(),
            created: s.created_at().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            age: format_age(now.signed_duration_since(s.created_at())),
            version: s.metadata.source_version.clone(),
            size: format_size(s.size_bytes()),
            protected: if s.protected { "yes" } else { "" },
        })
        .collect();

    let mut output = Table::new(rows).with(Style::rounded()).to_string();
    output.push_str(&format!("\nTotal: {} snapshot(s)", snapshots.len()));
    output
}

/// Format one snapshot with its integrity report
pub fn format_snapshot_details(snapshot: &SnapshotInfo, report: &VerifyReport) -> String {
    let meta = &snapshot.metadata;
    let mut output = String::new();
    output.push_str(&format!("Snapshot:  {}\n", snapshot.id()));
    output.push_str(&format!("Kind:      {}\n", meta.kind));
    output.push_str(&format!(
        "Created:   {}\n",
        meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!("Version:   {}\n", meta.source_version));
    output.push_str(&format!("Location:  {}\n", snapshot.path.display()));
    output.push_str(&format!(
        "Payloads:  config {}, database {}, tree {}\n",
        format_size(meta.sizes.config),
        format_size(meta.sizes.database),
        format_size(meta.sizes.tree)
    ));
    if report.is_ok() {
        output.push_str("Integrity: OK");
    } else {
        output.push_str("Integrity: FAILED");
        for problem in &report.problems {
            output.push_str(&format!("\n  - {}", problem));
        }
    }
    output
}

/// Format what a retention pass keeps and deletes
pub fn format_retention_plan(plan: &RetentionPlan, applied: bool) -> String {
    if plan.delete.is_empty() {
        return format!("Nothing to prune ({} snapshot(s) kept).", plan.keep.len());
    }
    let verb = if applied { "Deleted" } else { "Would delete" };
    let mut output = format!("{} {} snapshot(s):", verb, plan.delete.len());
    for id in &plan.delete {
        output.push_str(&format!("\n  - {}", id));
    }
    output.push_str(&format!("\nKept {} snapshot(s).", plan.keep.len()));
    output
}

fn format_age(duration: chrono::Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}
