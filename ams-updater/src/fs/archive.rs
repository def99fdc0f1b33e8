//! Package archive extraction.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use tar::Archive;

/// Unpack a `.tar.gz`, `.tgz` or `.tar` archive into `dest`.
///
/// Entries that would land outside `dest` are skipped by `tar`.
pub fn extract(archive: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    let reader = BufReader::new(File::open(archive)?);

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack(GzDecoder::new(reader), dest)
    } else if name.ends_with(".tar") {
        unpack(reader, dest)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported archive format: {}", archive.display()),
        ))
    }
}

fn unpack<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(dest)
}
