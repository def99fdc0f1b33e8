//! Copy, delete and permission primitives.

use crate::fs::walker::{walk_tree, EntryKind};
use std::fs;
use std::io;
use std::path::Path;

/// Recursively copy `from` into `to`, overwriting what is already there.
///
/// Returns the number of files copied. Permissions travel with files and
/// directories; symlinks are recreated, not followed.
pub fn copy_tree(from: &Path, to: &Path) -> io::Result<u64> {
    let root_meta = fs::metadata(from)?;
    if !root_meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", from.display()),
        ));
    }

    fs::create_dir_all(to)?;
    fs::set_permissions(to, root_meta.permissions())?;

    let mut copied = 0u64;
    for entry in walk_tree(from)? {
        let dest = to.join(&entry.relative_path);
        clear_conflict(&dest, entry.kind)?;

        match entry.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&dest)?;
                fs::set_permissions(&dest, fs::metadata(&entry.path)?.permissions())?;
            }
            EntryKind::File => {
                fs::copy(&entry.path, &dest)?;
                copied += 1;
            }
            EntryKind::Symlink => copy_symlink(&entry.path, &dest)?,
        }
    }

    Ok(copied)
}

/// Copy one file, creating missing parent directories.
pub fn copy_file(from: &Path, to: &Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    clear_conflict(to, EntryKind::File)?;
    fs::copy(from, to)
}

/// Remove a directory tree. Returns false when it did not exist.
pub fn remove_tree(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).map(|_| true),
        Ok(_) => fs::remove_file(path).map(|_| true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Remove a single file or symlink. Returns false when it did not exist.
pub fn remove_file(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Add execute bits for every class that can already read the file.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    let mode = perms.mode();
    perms.set_mode(mode | ((mode & 0o444) >> 2));
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub fn set_executable(path: &Path) -> io::Result<()> {
    fs::metadata(path).map(|_| ())
}

/// Make room at `dest` when an entry of a different kind is in the way.
fn clear_conflict(dest: &Path, wanted: EntryKind) -> io::Result<()> {
    let meta = match fs::symlink_metadata(dest) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let existing = if meta.file_type().is_symlink() {
        EntryKind::Symlink
    } else if meta.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    };

    if existing == wanted && wanted != EntryKind::Symlink {
        return Ok(());
    }

    remove_tree(dest).map(|_| ())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}
