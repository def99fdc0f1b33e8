//! Directory traversal for snapshot, restore and prune operations.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// An entry discovered under a root, excluding the root itself.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Full path to the entry
    pub path: PathBuf,

    /// Path relative to the walked root
    pub relative_path: PathBuf,

    pub kind: EntryKind,
}

impl TreeEntry {
    fn from_entry(entry: &DirEntry, root: &Path) -> Self {
        let file_type = entry.file_type();
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        // Symlinks are recorded as links, never followed
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        Self {
            path,
            relative_path,
            kind,
        }
    }
}

/// Walk `root` and return every entry below it, parents before children.
///
/// A missing root yields an empty list.
pub fn walk_tree(root: &Path) -> io::Result<Vec<TreeEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        entries.push(TreeEntry::from_entry(&entry, root));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let entries = walk_tree(temp_dir.path())?;
        assert_eq!(entries.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_missing_root() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let entries = walk_tree(&temp_dir.path().join("absent"))?;
        assert!(entries.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let entries = walk_tree(temp_dir.path())?;
        let relative: Vec<_> = entries
            .iter()
            .map(|e| e.relative_path.to_string_lossy().to_string())
            .collect();

        assert_eq!(relative, vec!["file1.txt", "subdir", "subdir/file2.txt"]);
        assert_eq!(entries[1].kind, EntryKind::Dir);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_symlinks_not_followed() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join("real"))?;
        fs::write(temp_dir.path().join("real/a.txt"), b"a")?;
        std::os::unix::fs::symlink("real", temp_dir.path().join("link"))?;

        let entries = walk_tree(temp_dir.path())?;
        let link = entries
            .iter()
            .find(|e| e.relative_path == Path::new("link"))
            .unwrap();

        assert_eq!(link.kind, EntryKind::Symlink);
        assert_eq!(entries.len(), 3);
        Ok(())
    }
}
