//! Stage loader: replace a staging table's contents with one object-store
//! location.

use tidemark_types::error::TaskError;
use tidemark_warehouse::sql::quote_qualified;
use tidemark_warehouse::{CopyCommand, CopyOptions, Credentials, Statement, Warehouse, WarehouseError};

/// Outcome of a successful stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub table: String,
    pub location: String,
    /// Rows reported by the bulk copy.
    pub rows: u64,
}

/// Empty `table`, then bulk-copy `location` into it.
///
/// Both statements run in one transaction, delete first. Running the same
/// stage twice leaves the same staged content.
///
/// # Errors
///
/// Returns `CONNECT_FAILED` if the connection drops, otherwise
/// `STAGE_FAILED` carrying the failing statement with credentials redacted.
pub fn stage(
    warehouse: &mut dyn Warehouse,
    table: &str,
    location: &str,
    credentials: Option<&Credentials>,
    options: &CopyOptions,
) -> Result<StageResult, TaskError> {
    let copy = Statement::Copy(CopyCommand {
        table: table.to_string(),
        location: location.to_string(),
        credentials: credentials.cloned(),
        options: options.clone(),
    });
    let statements = [
        Statement::sql(format!("DELETE FROM {}", quote_qualified(table))),
        copy,
    ];

    tracing::debug!(table, location, "Staging table");
    let affected = warehouse
        .run_in_transaction(&statements)
        .map_err(|e| stage_error(&e, &statements[1]))?;

    Ok(StageResult {
        table: table.to_string(),
        location: location.to_string(),
        rows: affected.last().copied().unwrap_or(0),
    })
}

fn stage_error(err: &WarehouseError, copy: &Statement) -> TaskError {
    if err.is_connection() {
        return TaskError::connect_failed(err.to_string());
    }
    let sql = err
        .sql()
        .map_or_else(|| copy.display_sql(), ToString::to_string);
    TaskError::stage_failed(err.to_string(), sql)
}
