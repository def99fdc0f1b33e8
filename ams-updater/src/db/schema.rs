//! Schema inspection and mutation primitives used by migrations.
//!
//! Every idempotency check goes through [`SchemaStore::list_columns`], which
//! reads `PRAGMA table_info` for the table. A table with no columns does not
//! exist. Column names are compared ASCII case-insensitively, as SQLite does.

use crate::manifest::SeedRow;
use crate::utils::{Result, UpdateError};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated(usize),
    Inserted,
}

/// Database capabilities the migrator relies on.
pub trait SchemaStore {
    /// Lowercased column names of `table`; empty when the table does not exist.
    fn list_columns(&self, table: &str) -> Result<BTreeSet<String>>;

    fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        Ok(self
            .list_columns(table)?
            .contains(&column.to_ascii_lowercase()))
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(!self.list_columns(table)?.is_empty())
    }

    /// Run exactly one DDL/DML statement; trailing statements are an error.
    fn execute(&self, sql: &str) -> Result<()>;

    /// Create `table` and insert `rows` atomically.
    fn create_table_seeded(&self, table: &str, definition: &str, rows: &[SeedRow]) -> Result<()>;

    /// Update the row whose `key_column` equals `key`, inserting it if none matched.
    fn upsert_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &serde_json::Value,
        values: &SeedRow,
    ) -> Result<UpsertOutcome>;
}

impl SchemaStore for Connection {
    fn list_columns(&self, table: &str) -> Result<BTreeSet<String>> {
        let mut stmt = self.prepare(&format!("PRAGMA table_info({})", quote_ident(table)?))?;
        let columns = stmt
            .query_map([], |row| {
                row.get::<_, String>(1).map(|name| name.to_ascii_lowercase())
            })?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(columns)
    }

    fn execute(&self, sql: &str) -> Result<()> {
        Connection::execute(self, sql, [])?;
        Ok(())
    }

    fn create_table_seeded(&self, table: &str, definition: &str, rows: &[SeedRow]) -> Result<()> {
        let tx = self.unchecked_transaction()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(table)?,
            definition
        );
        // `execute` refuses SQL with a trailing second statement
        tx.execute(&sql, [])?;
        for row in rows {
            insert_row(&tx, table, row)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &serde_json::Value,
        values: &SeedRow,
    ) -> Result<UpsertOutcome> {
        let updates: Vec<(&String, &serde_json::Value)> = values
            .iter()
            .filter(|(column, _)| column.as_str() != key_column)
            .collect();
        if updates.is_empty() {
            return Err(UpdateError::migration(
                table,
                "upsert has no values besides the key",
            ));
        }

        let tx = self.unchecked_transaction()?;

        let assignments = updates
            .iter()
            .enumerate()
            .map(|(i, (column, _))| -> Result<String> {
                Ok(format!("{} = ?{}", quote_ident(column)?, i + 1))
            })
            .collect::<Result<Vec<String>>>()?;
        let mut params = updates
            .iter()
            .map(|(_, value)| to_sql_value(value))
            .collect::<Result<Vec<Value>>>()?;
        params.push(to_sql_value(key)?);

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(table)?,
            assignments.join(", "),
            quote_ident(key_column)?,
            params.len()
        );
        let changed = tx.execute(&sql, params_from_iter(params))?;

        let outcome = if changed == 0 {
            let mut row = values.clone();
            row.insert(key_column.to_string(), key.clone());
            insert_row(&tx, table, &row)?;
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated(changed)
        };

        tx.commit()?;
        Ok(outcome)
    }
}

fn insert_row(conn: &Connection, table: &str, row: &SeedRow) -> Result<()> {
    let table = quote_ident(table)?;

    if row.is_empty() {
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", table), [])?;
        return Ok(());
    }

    let columns = row
        .keys()
        .map(|column| quote_ident(column))
        .collect::<Result<Vec<String>>>()?;
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
    let params = row
        .values()
        .map(to_sql_value)
        .collect::<Result<Vec<Value>>>()?;

    conn.execute(
        &format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        ),
        params_from_iter(params),
    )?;
    Ok(())
}

/// Validate a table or column name and quote it for SQLite.
pub fn quote_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(UpdateError::migration(name, "invalid identifier"));
    }
    Ok(format!("\"{}\"", name))
}

/// Render a scalar as an SQL literal, for `DEFAULT` clauses.
pub fn sql_literal(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::Null => Ok("NULL".to_string()),
        serde_json::Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        other => Err(UpdateError::migration(
            other.to_string(),
            "only scalar values can be stored",
        )),
    }
}

fn to_sql_value(value: &serde_json::Value) -> Result<Value> {
    match value {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n.as_f64().map(Value::Real).ok_or_else(|| {
                UpdateError::migration(n.to_string(), "number out of range")
            }),
        },
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        other => Err(UpdateError::migration(
            other.to_string(),
            "only scalar values can be stored",
        )),
    }
}
