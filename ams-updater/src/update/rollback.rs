//! Restore the live tree from the pre-update snapshot.

use crate::fs::walker::EntryKind;
use crate::fs::Host;
use crate::update::backup::BackupSnapshot;
use crate::utils::{Result, UpdateError};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreStats {
    /// Files copied back from the snapshot
    pub restored: u64,
    /// Entries removed because they did not exist at snapshot time
    pub pruned: usize,
}

pub struct RollbackController<'a> {
    host: &'a dyn Host,
}

impl<'a> RollbackController<'a> {
    pub fn new(host: &'a dyn Host) -> Self {
        Self { host }
    }

    /// Make `live_root` match the snapshot exactly: every snapshot entry is
    /// copied back, then everything the update added is pruned.
    ///
    /// Any failure here is fatal for the run; the device is left as-is for
    /// manual recovery.
    pub fn rollback(&self, snapshot: &BackupSnapshot, live_root: &Path) -> Result<RestoreStats> {
        let source = &snapshot.destination_path;
        self.host.check_readable_dir(source).map_err(|e| {
            UpdateError::Rollback(format!("snapshot {} is unreadable: {}", source.display(), e))
        })?;

        tracing::warn!(
            snapshot = %source.display(),
            live = %live_root.display(),
            "Restoring live tree from snapshot"
        );

        let restored = self.host.copy_tree(source, live_root).map_err(|e| {
            UpdateError::Rollback(format!("restoring {} failed: {}", live_root.display(), e))
        })?;

        let pruned = self.prune(source, live_root)?;

        tracing::info!(restored, pruned, "Rollback complete");
        Ok(RestoreStats { restored, pruned })
    }

    fn prune(&self, snapshot_root: &Path, live_root: &Path) -> Result<usize> {
        let list = |root: &Path| {
            self.host.list_tree(root).map_err(|e| {
                UpdateError::Rollback(format!("cannot list {}: {}", root.display(), e))
            })
        };

        let keep: HashSet<PathBuf> = list(snapshot_root)?
            .into_iter()
            .map(|entry| entry.relative_path)
            .collect();

        let mut removed_dirs: Vec<PathBuf> = Vec::new();
        let mut pruned = 0;
        for entry in list(live_root)? {
            if keep.contains(&entry.relative_path)
                || removed_dirs.iter().any(|dir| entry.relative_path.starts_with(dir))
            {
                continue;
            }

            let removed = match entry.kind {
                EntryKind::Dir => self.host.remove_tree(&entry.path),
                EntryKind::File | EntryKind::Symlink => self.host.remove_file(&entry.path),
            }
            .map_err(|e| {
                UpdateError::Rollback(format!("cannot remove {}: {}", entry.path.display(), e))
            })?;

            if entry.kind == EntryKind::Dir {
                removed_dirs.push(entry.relative_path.clone());
            }
            if removed {
                tracing::debug!(path = %entry.relative_path.display(), "Pruned");
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}
