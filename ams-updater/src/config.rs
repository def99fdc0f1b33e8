//! Configuration management for the updater.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! (`AMS_UPDATER__PATHS__LIVE_ROOT=/opt/ams` and so on).

use crate::utils::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "AMS_UPDATER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub paths: PathsConfig,
    pub packages: PackagesConfig,
    pub deploy: DeployConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Identifier used in logs, defaults to the hostname
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Live deployment root that gets snapshotted and updated
    pub live_root: PathBuf,

    /// Single backup slot; wiped before each new snapshot
    pub backup_root: PathBuf,

    /// Staging directory holding `manifest.toml`, `files/` and `packages/`
    pub staging_dir: PathBuf,

    /// Permanent location for extracted package archives
    pub install_root: PathBuf,

    /// Scratch directory archives are unpacked into before installing
    pub work_dir: PathBuf,

    /// Service-manager unit directory
    pub service_dir: PathBuf,

    /// SQLite database migrated by the run
    pub database: PathBuf,

    /// Lock file guarding against overlapping runs
    pub lock_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Command run inside each extracted archive
    pub install_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Deployed files with these extensions are made executable
    pub executable_extensions: Vec<String>,

    /// Run after service units are installed, e.g. `systemctl daemon-reload`
    pub service_reload_command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "ams-controller".to_string()),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            live_root: PathBuf::from("/opt/ams"),
            backup_root: PathBuf::from("/var/backups/ams"),
            staging_dir: PathBuf::from("/var/lib/ams-updater/staging"),
            install_root: PathBuf::from("/opt/ams-packages"),
            work_dir: PathBuf::from("/var/lib/ams-updater/work"),
            service_dir: PathBuf::from("/etc/systemd/system"),
            database: PathBuf::from("/opt/ams/ams.db"),
            lock_file: PathBuf::from("/run/ams-updater.lock"),
        }
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            install_command: vec![
                "python3".to_string(),
                "setup.py".to_string(),
                "install".to_string(),
            ],
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            executable_extensions: vec!["sh".to_string(), "py".to_string()],
            service_reload_command: Some(vec![
                "systemctl".to_string(),
                "daemon-reload".to_string(),
            ]),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| UpdateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string, without environment overrides.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| UpdateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let paths = &self.paths;

        if paths.backup_root.starts_with(&paths.live_root) {
            return Err(UpdateError::Config(format!(
                "backup_root {} must not be inside live_root {}",
                paths.backup_root.display(),
                paths.live_root.display()
            )));
        }

        if paths.live_root.starts_with(&paths.backup_root) {
            return Err(UpdateError::Config(format!(
                "live_root {} must not be inside backup_root {}",
                paths.live_root.display(),
                paths.backup_root.display()
            )));
        }

        // the snapshot of live_root must cover the database
        if !paths.database.starts_with(&paths.live_root) {
            return Err(UpdateError::Config(format!(
                "database {} must be inside live_root {}",
                paths.database.display(),
                paths.live_root.display()
            )));
        }

        if self.packages.install_command.is_empty() {
            return Err(UpdateError::Config(
                "packages.install_command must not be empty".to_string(),
            ));
        }

        if let Some(reload) = &self.deploy.service_reload_command {
            if reload.is_empty() {
                return Err(UpdateError::Config(
                    "deploy.service_reload_command must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Point every path at a directory under `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Config {
            paths: PathsConfig {
                live_root: root.join("live"),
                backup_root: root.join("backup"),
                staging_dir: root.join("staging"),
                install_root: root.join("packages"),
                work_dir: root.join("work"),
                service_dir: root.join("services"),
                database: root.join("live").join("ams.db"),
                lock_file: root.join("ams-updater.lock"),
            },
            ..Config::default()
        }
    }
}
