//! `PostgreSQL`-protocol implementation of [`Warehouse`].
//!
//! Uses the sync `postgres` crate, which manages its own internal tokio
//! runtime, so connections work from blocking worker threads. Redshift
//! speaks the same wire protocol and is the primary target.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use postgres::{CancelToken, Client, NoTls, SimpleQueryMessage};

use crate::backend::{AbortHandle, Statement, Warehouse, WarehouseConnector};
use crate::error::{self, WarehouseError};
use crate::value::{Row, Value};

/// Connector that opens one `postgres::Client` per [`connect`](WarehouseConnector::connect).
///
/// `connstr` is a libpq-style connection string or `PostgreSQL` URI:
/// - `"host=localhost port=5439 dbname=dev user=awsuser password=..."`
/// - `"postgresql://awsuser@cluster.example.com:5439/dev"`
#[derive(Clone)]
pub struct PostgresConnector {
    connstr: String,
}

impl PostgresConnector {
    #[must_use]
    pub fn new(connstr: impl Into<String>) -> Self {
        Self {
            connstr: connstr.into(),
        }
    }
}

impl fmt::Debug for PostgresConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("target", &self.describe())
            .finish()
    }
}

impl WarehouseConnector for PostgresConnector {
    fn connect(&self) -> error::Result<Box<dyn Warehouse>> {
        let client = Client::connect(&self.connstr, NoTls)
            .map_err(|e| WarehouseError::Connect(e.to_string()))?;
        tracing::debug!(warehouse = %self.describe(), "Opened warehouse connection");
        Ok(Box::new(PostgresWarehouse { client }))
    }

    fn describe(&self) -> String {
        describe_connstr(&self.connstr)
    }
}

/// Strip passwords from a connection string for display.
fn describe_connstr(connstr: &str) -> String {
    if connstr.contains("://") {
        // URI form: drop the userinfo section entirely.
        match (connstr.find("://"), connstr.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}{}", &connstr[..scheme_end + 3], &connstr[at + 1..])
            }
            _ => connstr.to_string(),
        }
    } else {
        connstr
            .split_whitespace()
            .filter(|kv| !kv.starts_with("password="))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A live `PostgreSQL`/Redshift session.
pub struct PostgresWarehouse {
    client: Client,
}

/// Whether a driver error means the session is gone: the client closed,
/// or the socket failed underneath a statement.
fn is_connection_loss(closed: bool, source: Option<&(dyn StdError + 'static)>) -> bool {
    closed || source.is_some_and(|s| s.is::<std::io::Error>())
}

fn map_error(sql: &str, err: &postgres::Error) -> WarehouseError {
    if is_connection_loss(err.is_closed(), err.source()) {
        return WarehouseError::Connect(err.to_string());
    }
    let message = err
        .as_db_error()
        .map_or_else(|| err.to_string(), |db| db.message().to_string());
    WarehouseError::statement(sql, message)
}

impl Warehouse for PostgresWarehouse {
    fn execute(&mut self, sql: &str) -> error::Result<u64> {
        self.client
            .execute(sql, &[])
            .map_err(|e| map_error(sql, &e))
    }

    fn query(&mut self, sql: &str) -> error::Result<Vec<Row>> {
        let mut tx = self
            .client
            .build_transaction()
            .read_only(true)
            .start()
            .map_err(|e| map_error("START TRANSACTION READ ONLY", &e))?;
        // Preparing rejects multi-statement batches before anything runs.
        tx.prepare(sql).map_err(|e| map_error(sql, &e))?;
        // Simple-query protocol returns text for every column, which keeps
        // NUMERIC and other types without a native mapping readable.
        let messages = tx.simple_query(sql).map_err(|e| map_error(sql, &e))?;
        tx.rollback().map_err(|e| map_error("ROLLBACK", &e))?;

        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let values = (0..row.len())
                    .map(|i| row.get(i).map_or(Value::Null, |s| Value::Text(s.to_string())))
                    .collect();
                rows.push(values);
            }
        }
        Ok(rows)
    }

    fn run_in_transaction(&mut self, statements: &[Statement]) -> error::Result<Vec<u64>> {
        let mut tx = self
            .client
            .transaction()
            .map_err(|e| map_error("BEGIN", &e))?;

        let mut affected = Vec::with_capacity(statements.len());
        for statement in statements {
            let rows = match statement {
                Statement::Sql(sql) => tx.execute(sql.as_str(), &[]),
                Statement::Copy(command) => tx.execute(command.to_sql().as_str(), &[]),
            }
            .map_err(|e| map_error(&statement.display_sql(), &e))?;
            affected.push(rows);
        }

        tx.commit().map_err(|e| map_error("COMMIT", &e))?;
        Ok(affected)
    }

    fn abort_handle(&self) -> Option<Arc<dyn AbortHandle>> {
        Some(Arc::new(PostgresAbort(self.client.cancel_token())))
    }
}

struct PostgresAbort(CancelToken);

impl AbortHandle for PostgresAbort {
    fn abort(&self) {
        if let Err(e) = self.0.cancel_query(NoTls) {
            tracing::warn!(error = %e, "Failed to cancel in-flight warehouse query");
        }
    }
}
