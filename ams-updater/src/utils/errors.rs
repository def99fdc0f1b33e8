//! Error types for the update orchestrator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Migration error on {target}: {message}")]
    Migration { target: String, message: String },

    #[error("Package install error on {target}: {message}")]
    PackageInstall { target: String, message: String },

    #[error("File deploy error on {target}: {message}")]
    FileDeploy { target: String, message: String },

    #[error("Rollback error: {0}")]
    Rollback(String),

    #[error("Run aborted: {0}")]
    RunAborted(String),

    #[error("Update run already in progress (lock held on {0})")]
    Locked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl UpdateError {
    pub fn migration(target: impl Into<String>, message: impl ToString) -> Self {
        UpdateError::Migration {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn package_install(target: impl Into<String>, message: impl ToString) -> Self {
        UpdateError::PackageInstall {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn file_deploy(target: impl Into<String>, message: impl ToString) -> Self {
        UpdateError::FileDeploy {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// True for errors that leave the device needing manual recovery.
    pub fn is_fatal(&self) -> bool {
        matches!(self, UpdateError::Rollback(_))
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
