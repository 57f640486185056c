//! Warehouse connector contract.
//!
//! A [`WarehouseConnector`] hands out one logical connection per caller;
//! a [`Warehouse`] is that connection. Connections are not shared across
//! concurrent tasks.

use std::sync::Arc;

use crate::copy::CopyCommand;
use crate::error;
use crate::value::Row;

/// One step of a transactional batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// Opaque SQL text, executed as-is.
    Sql(String),
    /// Bulk copy from an object-store location into a table.
    Copy(CopyCommand),
}

impl Statement {
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::Sql(sql.into())
    }

    /// SQL text safe for logs and error reports.
    #[must_use]
    pub fn display_sql(&self) -> String {
        match self {
            Self::Sql(sql) => sql.clone(),
            Self::Copy(command) => command.to_redacted_sql(),
        }
    }
}

/// Cancels whatever statement is currently in flight on a connection.
pub trait AbortHandle: Send + Sync {
    fn abort(&self);
}

/// A single warehouse connection.
pub trait Warehouse: Send {
    /// Run a write statement, returning the number of rows affected.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`](crate::WarehouseError) if the statement is
    /// rejected or the connection drops.
    fn execute(&mut self, sql: &str) -> error::Result<u64>;

    /// Run a single read-only query, returning every row in order.
    ///
    /// Implementations must refuse statements that write and batches of
    /// more than one statement.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`](crate::WarehouseError) if the query is
    /// rejected, would write, or the connection drops.
    fn query(&mut self, sql: &str) -> error::Result<Vec<Row>>;

    /// Run `statements` strictly in order inside one transaction.
    ///
    /// Each statement completes before the next begins. Returns the rows
    /// affected per statement. On failure the transaction is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first statement failure; the SQL attached to the error is
    /// the failing statement's redacted text.
    fn run_in_transaction(&mut self, statements: &[Statement]) -> error::Result<Vec<u64>>;

    /// Handle that can cancel an in-flight statement from another thread.
    ///
    /// Backends without an abort capability return `None`.
    fn abort_handle(&self) -> Option<Arc<dyn AbortHandle>> {
        None
    }

    /// Cheap round-trip used by connectivity checks.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError`](crate::WarehouseError) if the warehouse
    /// does not answer.
    fn ping(&mut self) -> error::Result<()> {
        self.query("SELECT 1").map(|_| ())
    }
}

/// Factory for warehouse connections.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn WarehouseConnector>`.
pub trait WarehouseConnector: Send + Sync {
    /// Open a new logical connection.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Connect`](crate::WarehouseError::Connect)
    /// when the warehouse cannot be reached.
    fn connect(&self) -> error::Result<Box<dyn Warehouse>>;

    /// Human-readable target description with secrets removed.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::{CopyOptions, Credentials};

    /// Verify the traits are object-safe.
    #[test]
    fn traits_are_object_safe() {
        fn _assert_warehouse(_: &dyn Warehouse) {}
        fn _assert_connector(_: &dyn WarehouseConnector) {}
        fn _assert_abort(_: &dyn AbortHandle) {}
    }

    #[test]
    fn copy_statement_display_is_redacted() {
        let stmt = Statement::Copy(CopyCommand {
            table: "staging_events".into(),
            location: "s3://bucket/log_data/".into(),
            credentials: Some(Credentials::AccessKey {
                access_key_id: "AKIAEXAMPLE".into(),
                secret_access_key: "supersecret".into(),
            }),
            options: CopyOptions::default(),
        });
        let shown = stmt.display_sql();
        assert!(shown.contains("staging_events"));
        assert!(!shown.contains("supersecret"));
        assert!(!shown.contains("AKIAEXAMPLE"));
    }
}
