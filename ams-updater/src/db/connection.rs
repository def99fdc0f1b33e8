use crate::utils::Result;
use rusqlite::Connection;
use std::path::Path;

/// Open the device database with durable settings.
///
/// The file lives inside the deployment tree, so the rollback journal is kept
/// next to it instead of in WAL files that a tree restore would miss.
pub fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = DELETE;
         PRAGMA synchronous = FULL;
         PRAGMA foreign_keys = ON;",
    )?;

    tracing::debug!(path = %db_path.display(), "Opened database");
    Ok(conn)
}
