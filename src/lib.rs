//! steward - lifecycle orchestration and snapshot backup/restore
//!
//! This library installs, updates, rolls back and uninstalls one installation
//! of a stateful web application: an application tree, a PostgreSQL database
//! and a generated config file. Every destructive step is preceded by a
//! snapshot of all three.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: state paths and operator settings
//! - `error`: custom error types
//! - `version`: dotted numeric version comparison
//! - `models`: snapshots, the installation, the app config file, results
//! - `storage`: atomic JSON file helpers
//! - `credentials`: secrets for one operation, zeroized on drop
//! - `system`: traits and production implementations for OS collaborators
//! - `backup`: snapshot store, retention, capture and restore
//! - `lifecycle`: the orchestrator, lock, interrupt guard and health checks
//! - `cli` / `display`: command handlers and terminal formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use steward::config::{Settings, StewardPaths};
//! use steward::credentials::GeneratedCredentials;
//! use steward::lifecycle::{Orchestrator, UpdateRequest};
//! use steward::system::Host;
//!
//! let paths = StewardPaths::new();
//! let settings = Settings::load_or_create(&paths)?;
//! let host = Host::system(&paths, &settings, "/srv/bundle".into(), Box::new(GeneratedCredentials));
//! let result = Orchestrator::new(&paths, &settings, &host).update(&UpdateRequest::default())?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod display;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod storage;
pub mod system;
pub mod version;

#[cfg(test)]
pub mod testing;

pub use error::{StewardError, StewardResult};
