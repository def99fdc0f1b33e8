//! Utility modules for the updater.

pub mod errors;
pub mod logger;

pub use errors::{Result, UpdateError};
