//! Display formatting for terminal output
//!
//! Every formatter returns a `String`; the CLI layer decides where it goes.

pub mod lifecycle;
pub mod snapshot;

pub use lifecycle::{format_lifecycle_result, format_status, format_uninstall_report};
pub use snapshot::{format_retention_plan, format_snapshot_details, format_snapshot_list};

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
