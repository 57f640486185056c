//! Table loader: populate a dimension or fact table from a `SELECT` over
//! staging.

use tidemark_types::error::TaskError;
use tidemark_types::table::{LoadPolicy, TableDescriptor};
use tidemark_warehouse::sql::quote_qualified;
use tidemark_warehouse::{Statement, Warehouse};

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub table: String,
    pub policy: LoadPolicy,
    /// Rows inserted by the `INSERT ... SELECT`.
    pub rows: u64,
}

/// Statements a load issues, in execution order.
#[must_use]
pub fn load_statements(descriptor: &TableDescriptor) -> Vec<Statement> {
    let table = quote_qualified(&descriptor.table);
    let insert = if descriptor.columns.is_empty() {
        format!("INSERT INTO {table} {}", descriptor.select_sql.trim())
    } else {
        let columns = descriptor
            .columns
            .iter()
            .map(|c| quote_qualified(c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {table} ({columns}) {}", descriptor.select_sql.trim())
    };

    match descriptor.policy {
        LoadPolicy::Append => vec![Statement::Sql(insert)],
        // DELETE rather than TRUNCATE: TRUNCATE commits implicitly on Redshift.
        LoadPolicy::TruncateInsert => vec![
            Statement::Sql(format!("DELETE FROM {table}")),
            Statement::Sql(insert),
        ],
    }
}

/// Apply `descriptor` in a single transaction.
///
/// An empty source succeeds with zero rows.
///
/// # Errors
///
/// Returns `CONNECT_FAILED` if the connection drops, otherwise
/// `LOAD_FAILED` with the offending SQL text.
pub fn load(
    warehouse: &mut dyn Warehouse,
    descriptor: &TableDescriptor,
) -> Result<LoadResult, TaskError> {
    let statements = load_statements(descriptor);
    tracing::debug!(
        table = %descriptor.table,
        policy = %descriptor.policy,
        "Loading table"
    );

    let affected = warehouse.run_in_transaction(&statements).map_err(|e| {
        if e.is_connection() {
            TaskError::connect_failed(e.to_string())
        } else {
            let sql = e.sql().map_or_else(
                || statements.last().map(Statement::display_sql).unwrap_or_default(),
                ToString::to_string,
            );
            TaskError::load_failed(e.to_string(), sql)
        }
    })?;

    Ok(LoadResult {
        table: descriptor.table.clone(),
        policy: descriptor.policy,
        rows: affected.last().copied().unwrap_or(0),
    })
}
