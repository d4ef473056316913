//! Configuration module for steward
//!
//! - `paths`: where steward keeps its own state
//! - `settings`: the operator settings describing the managed installation

pub mod paths;
pub mod settings;

pub use paths::StewardPaths;
pub use settings::Settings;
