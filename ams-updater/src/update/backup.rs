//! Pre-update snapshot of the live deployment tree.

use crate::fs::Host;
use crate::utils::{Result, UpdateError};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

const SNAPSHOT_PREFIX: &str = "ams";

#[derive(Debug, Clone, Serialize)]
pub struct BackupSnapshot {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub created_at: DateTime<Local>,
    pub files: u64,
}

/// Owns the single backup slot under `backup_root`.
pub struct BackupManager<'a> {
    host: &'a dyn Host,
    backup_root: &'a Path,
}

impl<'a> BackupManager<'a> {
    pub fn new(host: &'a dyn Host, backup_root: &'a Path) -> Self {
        Self { host, backup_root }
    }

    /// Copy `source` into a fresh `<root>/ams-<version>-<local time>` directory.
    ///
    /// Whatever was in the backup root before is removed first, including the
    /// leftovers of a run that was killed mid-way.
    pub fn create_snapshot(&self, source: &Path, version: &str) -> Result<BackupSnapshot> {
        self.host.check_readable_dir(source).map_err(|e| {
            UpdateError::Backup(format!("cannot read {}: {}", source.display(), e))
        })?;

        match self.host.remove_tree(self.backup_root) {
            Ok(true) => tracing::info!(
                path = %self.backup_root.display(),
                "Removed previous backup generation"
            ),
            Ok(false) => {}
            Err(e) => {
                return Err(UpdateError::Backup(format!(
                    "cannot clear {}: {}",
                    self.backup_root.display(),
                    e
                )))
            }
        }

        let created_at = Local::now();
        let destination = self
            .backup_root
            .join(snapshot_dir_name(version, &created_at));

        self.host.create_dir_all(self.backup_root).map_err(|e| {
            UpdateError::Backup(format!("cannot create {}: {}", self.backup_root.display(), e))
        })?;

        let files = self.host.copy_tree(source, &destination).map_err(|e| {
            UpdateError::Backup(format!(
                "copying {} to {} failed: {}",
                source.display(),
                destination.display(),
                e
            ))
        })?;

        tracing::info!(
            path = %destination.display(),
            files,
            "Created backup snapshot"
        );

        Ok(BackupSnapshot {
            source_path: source.to_path_buf(),
            destination_path: destination,
            created_at,
            files,
        })
    }
}

fn snapshot_dir_name(version: &str, at: &DateTime<Local>) -> String {
    let version: String = version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{}-{}-{}",
        SNAPSHOT_PREFIX,
        version,
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::host::testing::{FaultyHost, Op};
    use crate::fs::SystemHost;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn live_tree(root: &Path) -> std::io::Result<PathBuf> {
        let live = root.join("live");
        fs::create_dir_all(live.join("app"))?;
        fs::write(live.join("app/main.py"), b"v1")?;
        fs::write(live.join("ams.db"), b"db")?;
        Ok(live)
    }

    #[test]
    fn test_snapshot_dir_name() {
        let at = Local.with_ymd_and_hms(2026, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(snapshot_dir_name("2.4.0", &at), "ams-2.4.0-2026-03-09_07-05-01");
        assert_eq!(snapshot_dir_name("v2 rc/1", &at), "ams-v2_rc_1-2026-03-09_07-05-01");
    }

    #[test]
    fn test_snapshot_copies_full_tree() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let live = live_tree(temp_dir.path())?;
        let backup_root = temp_dir.path().join("backup");

        let snapshot = BackupManager::new(&SystemHost, &backup_root)
            .create_snapshot(&live, "2.4.0")
            .unwrap();

        assert_eq!(snapshot.files, 2);
        assert!(snapshot.destination_path.starts_with(&backup_root));
        assert_eq!(fs::read(snapshot.destination_path.join("app/main.py"))?, b"v1");
        Ok(())
    }

    #[test]
    fn test_previous_generation_is_removed() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let live = live_tree(temp_dir.path())?;
        let backup_root = temp_dir.path().join("backup");
        fs::create_dir_all(backup_root.join("ams-1.0.0-2020-01-01_00-00-00"))?;

        BackupManager::new(&SystemHost, &backup_root)
            .create_snapshot(&live, "2.4.0")
            .unwrap();

        let generations: Vec<_> = fs::read_dir(&backup_root)?.collect();
        assert_eq!(generations.len(), 1);
        Ok(())
    }

    #[test]
    fn test_unreadable_source_keeps_old_backup() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let backup_root = temp_dir.path().join("backup");
        let old = backup_root.join("ams-1.0.0-2020-01-01_00-00-00");
        fs::create_dir_all(&old)?;

        let result = BackupManager::new(&SystemHost, &backup_root)
            .create_snapshot(&temp_dir.path().join("missing"), "2.4.0");

        assert!(matches!(result, Err(UpdateError::Backup(_))));
        assert!(old.exists());
        Ok(())
    }

    #[test]
    fn test_source_check_failure_touches_nothing() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let live = live_tree(temp_dir.path())?;
        let backup_root = temp_dir.path().join("backup");
        let old = backup_root.join("ams-1.0.0-2020-01-01_00-00-00");
        fs::create_dir_all(&old)?;
        let host = FaultyHost::new();
        host.fail(Op::ReadDir, "live");

        let result = BackupManager::new(&host, &backup_root).create_snapshot(&live, "2.4.0");

        assert!(matches!(result, Err(UpdateError::Backup(_))));
        assert_eq!(host.calls(Op::ReadDir), vec![live]);
        assert!(host.calls(Op::RemoveTree).is_empty());
        assert!(host.calls(Op::CopyTree).is_empty());
        assert!(old.exists());
        Ok(())
    }

    #[test]
    fn test_copy_failure_is_backup_error() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let live = live_tree(temp_dir.path())?;
        let backup_root = temp_dir.path().join("backup");
        let host = FaultyHost::new();
        host.fail(Op::CopyTree, "backup");

        let result = BackupManager::new(&host, &backup_root).create_snapshot(&live, "2.4.0");

        assert!(matches!(result, Err(UpdateError::Backup(_))));
        Ok(())
    }
}
