//! Database access for schema migrations.

pub mod connection;
pub mod schema;

pub use connection::open;
pub use schema::{quote_ident, SchemaStore, UpsertOutcome};
