//! AMS Updater Library
//!
//! Applies a staged update to an access-management controller: snapshot the
//! deployment, migrate the database, install packages, deploy files, and
//! restore the snapshot if anything failed.

pub mod config;
pub mod db;
pub mod fs;
pub mod manifest;
pub mod update;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use manifest::{StagingArea, UpdateManifest};
pub use update::{Outcome, RunReport, UpdateOrchestrator};
pub use utils::errors::{Result, UpdateError};
