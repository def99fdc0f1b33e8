//! Host side effects used by the update pipeline.
//!
//! Every filesystem and process operation the pipeline performs goes through
//! [`Host`], so the orchestration logic can be exercised against a host that
//! records calls and injects failures.

use crate::fs::{archive, copy, walker};
use std::io;
use std::path::Path;
use std::process::Command;

pub trait Host {
    /// Recursively copy a directory, overwriting existing entries.
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Copy one file, creating parent directories.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Delete a directory tree if present.
    fn remove_tree(&self, path: &Path) -> io::Result<bool>;

    /// Delete a file if present.
    fn remove_file(&self, path: &Path) -> io::Result<bool>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Fail unless `path` is a directory this process can list.
    fn check_readable_dir(&self, path: &Path) -> io::Result<()>;

    fn set_executable(&self, path: &Path) -> io::Result<()>;

    /// Entries below `root`, parents first.
    fn list_tree(&self, root: &Path) -> io::Result<Vec<walker::TreeEntry>>;

    fn extract_archive(&self, archive: &Path, dest: &Path) -> io::Result<()>;

    /// Run `command` with `cwd` as its working directory; non-zero exit is an error.
    fn run_command(&self, command: &[String], cwd: &Path) -> io::Result<()>;
}

/// The real host: local filesystem and child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn copy_tree(&self, from: &Path, to: &Path) -> io::Result<u64> {
        copy::copy_tree(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        copy::copy_file(from, to)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<bool> {
        copy::remove_tree(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<bool> {
        copy::remove_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn check_readable_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::read_dir(path).map(|_| ())
    }

    fn set_executable(&self, path: &Path) -> io::Result<()> {
        copy::set_executable(path)
    }

    fn list_tree(&self, root: &Path) -> io::Result<Vec<walker::TreeEntry>> {
        walker::walk_tree(root)
    }

    fn extract_archive(&self, archive: &Path, dest: &Path) -> io::Result<()> {
        archive::extract(archive, dest)
    }

    fn run_command(&self, command: &[String], cwd: &Path) -> io::Result<()> {
        let (program, args) = command.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command")
        })?;

        tracing::debug!(command = %command.join(" "), cwd = %cwd.display(), "Running command");
        let output = Command::new(program).args(args).current_dir(cwd).output()?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        Err(io::Error::other(format!(
            "`{}` exited with {}: {}",
            command.join(" "),
            output.status,
            last_line.trim()
        )))
    }
}
