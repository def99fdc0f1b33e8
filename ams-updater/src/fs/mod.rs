//! Filesystem and process primitives.

pub mod archive;
pub mod copy;
pub mod host;
pub mod walker;

pub use host::{Host, SystemHost};
pub use walker::{EntryKind, TreeEntry};
