//! Storage layer for steward
//!
//! JSON documents (settings, snapshot metadata, the release marker) are
//! written atomically and read back strictly.

pub mod file_io;

pub use file_io::{read_json_required, sync_dir, write_json_atomic};
