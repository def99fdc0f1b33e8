//! Exclusive run lock.

use crate::utils::{Result, UpdateError};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Held for the whole run; the `flock` is released on drop or process exit.
#[derive(Debug)]
pub struct RunLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without waiting. Fails with [`UpdateError::Locked`] if
    /// another run holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let mut lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
            if errno == Errno::EWOULDBLOCK {
                UpdateError::Locked(path.display().to_string())
            } else {
                UpdateError::Io(errno.into())
            }
        })?;

        let file: &mut File = &mut lock;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        tracing::debug!(path = %path.display(), "Acquired run lock");
        Ok(Self {
            _file: lock,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_is_rejected() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("run/ams-updater.lock");

        let first = RunLock::acquire(&path).unwrap();
        let second = RunLock::acquire(&path);
        assert!(matches!(second, Err(UpdateError::Locked(_))));

        drop(first);
        assert!(RunLock::acquire(&path).is_ok());
        Ok(())
    }

    #[test]
    fn test_lock_file_records_pid() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("ams-updater.lock");

        let lock = RunLock::acquire(&path).unwrap();
        let content = fs::read_to_string(lock.path())?;
        assert_eq!(content.trim(), std::process::id().to_string());
        Ok(())
    }
}
