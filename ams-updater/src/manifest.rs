//! Update manifest types.
//!
//! A manifest lives at `<staging>/manifest.toml` next to a `files/` tree
//! (sources for created and updated files) and a `packages/` directory
//! holding the dependency archives.

use crate::utils::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.toml";
const FILES_DIR: &str = "files";
const PACKAGES_DIR: &str = "packages";

const ARCHIVE_SUFFIXES: [&str; 3] = [".tar.gz", ".tgz", ".tar"];

/// One row of column values, keyed by column name.
pub type SeedRow = BTreeMap<String, serde_json::Value>;

/// Declarative description of one update run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateManifest {
    pub target_version: String,

    #[serde(default)]
    pub migrations: Vec<MigrationStep>,

    /// Installed in declared order; names are unique.
    #[serde(default)]
    pub packages: Vec<PackageSpec>,

    #[serde(default)]
    pub files_to_create: Vec<PathBuf>,

    #[serde(default)]
    pub files_to_update: Vec<PathBuf>,

    #[serde(default)]
    pub files_to_delete: Vec<PathBuf>,

    /// Created or updated files that also go into the service-unit directory.
    #[serde(default)]
    pub service_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,

    /// Archive file name under `<staging>/packages`
    pub main_archive: String,

    /// Installed in order, all before `main_archive`
    #[serde(default)]
    pub sub_packages: Vec<String>,
}

/// A single re-appliable schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationStep {
    AddColumn {
        table: String,
        column: String,
        column_type: String,
        #[serde(default)]
        default: Option<serde_json::Value>,
    },
    CreateTable {
        table: String,
        /// Column definitions, e.g. `id INTEGER PRIMARY KEY, name TEXT NOT NULL`
        definition: String,
        #[serde(default)]
        seed_rows: Vec<SeedRow>,
    },
    Upsert {
        table: String,
        key_column: String,
        key: serde_json::Value,
        values: SeedRow,
    },
}

impl MigrationStep {
    /// Identifier used when reporting failures for this step.
    pub fn target(&self) -> String {
        match self {
            MigrationStep::AddColumn { table, column, .. } => format!("{}.{}", table, column),
            MigrationStep::CreateTable { table, .. } => table.clone(),
            MigrationStep::Upsert {
                table,
                key_column,
                key,
                ..
            } => format!("{}[{}={}]", table, key_column, key),
        }
    }
}

impl PackageSpec {
    /// Archives in install order: sub-packages first, then the main archive.
    pub fn install_order(&self) -> impl Iterator<Item = &str> {
        self.sub_packages
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.main_archive.as_str()))
    }
}

/// Directory an archive extracts to: `foo-1.2.3.tar.gz` -> `foo-1.2.3`.
pub fn archive_dir_name(archive: &str) -> Option<&str> {
    let file_name = Path::new(archive).file_name()?.to_str()?;
    ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
}

/// Layout of a staging directory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn file(&self, relative: &Path) -> PathBuf {
        self.root.join(FILES_DIR).join(relative)
    }

    pub fn archive(&self, name: &str) -> PathBuf {
        self.root.join(PACKAGES_DIR).join(name)
    }

    /// Read and validate `manifest.toml`.
    pub fn load_manifest(&self) -> Result<UpdateManifest> {
        let path = self.manifest_path();
        let content = fs::read_to_string(&path).map_err(|e| {
            UpdateError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        UpdateManifest::from_toml(&content)
    }
}

impl UpdateManifest {
    pub fn from_toml(content: &str) -> Result<Self> {
        let manifest: UpdateManifest =
            toml::from_str(content).map_err(|e| UpdateError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_version.trim().is_empty() {
            return Err(UpdateError::Manifest("target_version is empty".to_string()));
        }

        for path in self
            .files_to_create
            .iter()
            .chain(&self.files_to_update)
            .chain(&self.files_to_delete)
            .chain(&self.service_files)
        {
            check_relative(path)?;
        }

        let deployed: HashSet<&PathBuf> = self
            .files_to_create
            .iter()
            .chain(&self.files_to_update)
            .collect();
        if let Some(orphan) = self.service_files.iter().find(|p| !deployed.contains(p)) {
            return Err(UpdateError::Manifest(format!(
                "service file {} is neither created nor updated",
                orphan.display()
            )));
        }
        if let Some(clash) = self.files_to_delete.iter().find(|p| deployed.contains(p)) {
            return Err(UpdateError::Manifest(format!(
                "{} is both deployed and deleted",
                clash.display()
            )));
        }

        let mut names = HashSet::new();
        for package in &self.packages {
            if package.name.trim().is_empty() {
                return Err(UpdateError::Manifest("package with empty name".to_string()));
            }
            if !names.insert(package.name.as_str()) {
                return Err(UpdateError::Manifest(format!(
                    "duplicate package {}",
                    package.name
                )));
            }
            for archive in package.install_order() {
                check_relative(Path::new(archive))?;
                if archive_dir_name(archive).is_none() {
                    return Err(UpdateError::Manifest(format!(
                        "package {}: unsupported archive name {}",
                        package.name, archive
                    )));
                }
            }
        }

        Ok(())
    }

    /// One-line description used in logs and `--check` output.
    pub fn summary(&self) -> String {
        format!(
            "version {}: {} migrations, {} packages, {} created, {} updated, {} deleted, {} service files",
            self.target_version,
            self.migrations.len(),
            self.packages.len(),
            self.files_to_create.len(),
            self.files_to_update.len(),
            self.files_to_delete.len(),
            self.service_files.len()
        )
    }
}

fn check_relative(path: &Path) -> Result<()> {
    let escapes = path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || path.as_os_str().is_empty() {
        return Err(UpdateError::Manifest(format!(
            "path {} must be relative and stay inside its root",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
target_version = "2.4.0"
files_to_create = ["bin/door_monitor.py"]
files_to_update = ["app/keypad.py", "units/ams.service"]
files_to_delete = ["app/legacy_buzzer.py"]
service_files = ["units/ams.service"]

[[migrations]]
kind = "add_column"
table = "users"
column = "pin_code"
column_type = "TEXT"
default = ""

[[migrations]]
kind = "create_table"
table = "door_events"
definition = "id INTEGER PRIMARY KEY, door TEXT NOT NULL, opened_at TEXT"
seed_rows = [{ id = 1, door = "main" }]

[[migrations]]
kind = "upsert"
table = "settings"
key_column = "key"
key = "buzzer_ms"
values = { value = "250" }

[[packages]]
name = "gpio"
main_archive = "RPi.GPIO-0.7.1.tar.gz"
sub_packages = ["setuptools-58.0.0.tar.gz", "wheel-0.37.0.tgz"]

[[packages]]
name = "mqtt"
main_archive = "paho-mqtt-1.6.1.tar.gz"
"#;

    #[test]
    fn test_parse_sample_manifest() {
        let manifest = UpdateManifest::from_toml(SAMPLE).unwrap();

        assert_eq!(manifest.target_version, "2.4.0");
        assert_eq!(manifest.migrations.len(), 3);
        assert_eq!(manifest.packages[0].name, "gpio");
        assert_eq!(manifest.packages[1].name, "mqtt");
        assert!(matches!(
            manifest.migrations[1],
            MigrationStep::CreateTable { ref seed_rows, .. } if seed_rows.len() == 1
        ));
    }

    #[test]
    fn test_install_order_puts_main_last() {
        let manifest = UpdateManifest::from_toml(SAMPLE).unwrap();
        let order: Vec<&str> = manifest.packages[0].install_order().collect();
        assert_eq!(
            order,
            vec![
                "setuptools-58.0.0.tar.gz",
                "wheel-0.37.0.tgz",
                "RPi.GPIO-0.7.1.tar.gz"
            ]
        );
    }

    #[test]
    fn test_archive_dir_name() {
        assert_eq!(archive_dir_name("foo-1.2.3.tar.gz"), Some("foo-1.2.3"));
        assert_eq!(archive_dir_name("foo-1.2.3.tgz"), Some("foo-1.2.3"));
        assert_eq!(archive_dir_name("vendor/foo.tar"), Some("foo"));
        assert_eq!(archive_dir_name("foo.zip"), None);
        assert_eq!(archive_dir_name(".tar.gz"), None);
    }

    #[test]
    fn test_step_targets() {
        let manifest = UpdateManifest::from_toml(SAMPLE).unwrap();
        assert_eq!(manifest.migrations[0].target(), "users.pin_code");
        assert_eq!(manifest.migrations[1].target(), "door_events");
        assert_eq!(manifest.migrations[2].target(), "settings[key=\"buzzer_ms\"]");
    }

    #[test]
    fn test_rejects_parent_dir_paths() {
        let result = UpdateManifest::from_toml(
            r#"
target_version = "1"
files_to_update = ["../etc/passwd"]
"#,
        );
        assert!(matches!(result, Err(UpdateError::Manifest(_))));
    }

    #[test]
    fn test_rejects_orphan_service_file() {
        let result = UpdateManifest::from_toml(
            r#"
target_version = "1"
files_to_update = ["app/main.py"]
service_files = ["units/ams.service"]
"#,
        );
        assert!(matches!(result, Err(UpdateError::Manifest(_))));
    }

    #[test]
    fn test_rejects_deploy_and_delete_of_same_path() {
        let result = UpdateManifest::from_toml(
            r#"
target_version = "1"
files_to_update = ["app/keypad.py"]
files_to_delete = ["app/keypad.py"]
"#,
        );
        assert!(matches!(result, Err(UpdateError::Manifest(ref m)) if m.contains("both")));
    }

    #[test]
    fn test_rejects_duplicate_packages() {
        let result = UpdateManifest::from_toml(
            r#"
target_version = "1"

[[packages]]
name = "gpio"
main_archive = "a-1.tar.gz"

[[packages]]
name = "gpio"
main_archive = "b-1.tar.gz"
"#,
        );
        assert!(matches!(result, Err(UpdateError::Manifest(_))));
    }

    #[test]
    fn test_rejects_blank_version() {
        let result = UpdateManifest::from_toml("target_version = \"  \"");
        assert!(matches!(result, Err(UpdateError::Manifest(_))));
    }

    #[test]
    fn test_load_manifest_from_staging() -> std::io::Result<()> {
        let temp_dir = tempfile::TempDir::new()?;
        fs::write(temp_dir.path().join(MANIFEST_FILE), SAMPLE)?;

        let staging = StagingArea::new(temp_dir.path());
        let manifest = staging.load_manifest().unwrap();
        assert_eq!(manifest.files_to_delete, vec![PathBuf::from("app/legacy_buzzer.py")]);
        assert_eq!(
            staging.archive("wheel-0.37.0.tgz"),
            temp_dir.path().join("packages/wheel-0.37.0.tgz")
        );
        Ok(())
    }

    #[test]
    fn test_missing_manifest_is_manifest_error() {
        let staging = StagingArea::new("/nonexistent/staging");
        assert!(matches!(staging.load_manifest(), Err(UpdateError::Manifest(_))));
    }
}
