//! Idempotent schema migrations.

use crate::db::schema::{quote_ident, sql_literal};
use crate::db::{SchemaStore, UpsertOutcome};
use crate::manifest::MigrationStep;
use crate::update::context::RunContext;
use crate::update::result::Phase;
use crate::utils::{Result, UpdateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Schema changed (column added, table created and seeded)
    Applied,
    /// Nothing to do, the step had been applied before
    AlreadyApplied,
    RowInserted,
    RowUpdated,
}

pub struct SchemaMigrator;

impl SchemaMigrator {
    /// Apply every manifest step in order, recording failures and carrying on.
    ///
    /// Returns the number of failed steps.
    pub fn apply_all<D: SchemaStore>(ctx: &mut RunContext<'_, D>) -> usize {
        let steps = &ctx.manifest.migrations;
        let Some(db) = ctx.db.as_ref() else {
            if !steps.is_empty() {
                tracing::warn!(steps = steps.len(), "Database unavailable, skipping migrations");
            }
            return 0;
        };

        let mut failed = 0;
        for step in steps {
            match Self::apply_step(db, step) {
                Ok(outcome) => {
                    tracing::info!(step = %step.target(), ?outcome, "Migration step done")
                }
                Err(e) => {
                    ctx.result.record(Phase::Migration, e);
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Apply one step. Re-applying a step that already took effect is a no-op.
    pub fn apply_step<D: SchemaStore>(db: &D, step: &MigrationStep) -> Result<StepOutcome> {
        Self::apply(db, step).map_err(|e| step_error(step, e))
    }

    fn apply<D: SchemaStore>(db: &D, step: &MigrationStep) -> Result<StepOutcome> {
        match step {
            MigrationStep::AddColumn {
                table,
                column,
                column_type,
                default,
            } => {
                let columns = db.list_columns(table)?;
                if columns.is_empty() {
                    return Err(UpdateError::migration(step.target(), "table does not exist"));
                }
                if columns.contains(&column.to_ascii_lowercase()) {
                    return Ok(StepOutcome::AlreadyApplied);
                }

                check_column_type(column_type)?;
                let mut sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table)?,
                    quote_ident(column)?,
                    column_type
                );
                if let Some(default) = default {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(&sql_literal(default)?);
                }
                db.execute(&sql)?;
                Ok(StepOutcome::Applied)
            }

            MigrationStep::CreateTable {
                table,
                definition,
                seed_rows,
            } => {
                // seed rows only ever go into a table this step created
                if db.table_exists(table)? {
                    return Ok(StepOutcome::AlreadyApplied);
                }
                db.create_table_seeded(table, definition, seed_rows)?;
                tracing::debug!(%table, seeded = seed_rows.len(), "Created table");
                Ok(StepOutcome::Applied)
            }

            MigrationStep::Upsert {
                table,
                key_column,
                key,
                values,
            } => match db.upsert_by_key(table, key_column, key, values)? {
                UpsertOutcome::Inserted => Ok(StepOutcome::RowInserted),
                UpsertOutcome::Updated(_) => Ok(StepOutcome::RowUpdated),
            },
        }
    }
}

/// Column types are spliced into DDL, so only type-name characters pass.
fn check_column_type(column_type: &str) -> Result<()> {
    let valid = !column_type.trim().is_empty()
        && column_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ','));
    if valid {
        Ok(())
    } else {
        Err(UpdateError::migration(column_type, "invalid column type"))
    }
}

/// Re-target any error raised while applying `step` at the step itself.
fn step_error(step: &MigrationStep, error: UpdateError) -> UpdateError {
    let target = step.target();
    match error {
        UpdateError::Migration {
            target: inner,
            message,
        } if inner == target => UpdateError::Migration { target, message },
        UpdateError::Migration {
            target: inner,
            message,
        } => UpdateError::migration(target, format!("{}: {}", inner, message)),
        other => UpdateError::migration(target, other),
    }
}
