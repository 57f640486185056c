//! `SQLite`-backed implementation of [`Warehouse`] for local runs and tests.
//!
//! Bulk copies are emulated: the copy location is read as a local file or
//! directory of JSON objects (newline-delimited or concatenated), and each
//! object becomes one row, matching keys to column names
//! case-insensitively. Only `auto` JSON paths are supported.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, InterruptHandle, TransactionBehavior};

use crate::backend::{AbortHandle, Statement, Warehouse, WarehouseConnector};
use crate::copy::CopyCommand;
use crate::error::{self, WarehouseError};
use crate::value::{Row, Value};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

enum SqliteTarget {
    File(PathBuf),
    Shared(Arc<Mutex<Connection>>),
}

/// Connector for a `SQLite` database.
///
/// File-backed connectors open a fresh connection per
/// [`connect`](WarehouseConnector::connect). In-memory connectors share one
/// connection behind a mutex, so concurrent callers are serialized.
pub struct SqliteConnector {
    target: SqliteTarget,
}

impl SqliteConnector {
    /// Connector for the database file at `path` (created on first connect).
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            target: SqliteTarget::File(path.into()),
        }
    }

    /// Connector for a private in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::Connect`] if the database can't be created.
    pub fn in_memory() -> error::Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| WarehouseError::Connect(e.to_string()))?;
        Ok(Self {
            target: SqliteTarget::Shared(Arc::new(Mutex::new(conn))),
        })
    }
}

impl WarehouseConnector for SqliteConnector {
    fn connect(&self) -> error::Result<Box<dyn Warehouse>> {
        let conn = match &self.target {
            SqliteTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| WarehouseError::Connect(e.to_string()))?;
                    }
                }
                let conn =
                    Connection::open(path).map_err(|e| WarehouseError::Connect(e.to_string()))?;
                conn.busy_timeout(BUSY_TIMEOUT)
                    .map_err(|e| WarehouseError::Connect(e.to_string()))?;
                Arc::new(Mutex::new(conn))
            }
            SqliteTarget::Shared(conn) => Arc::clone(conn),
        };
        Ok(Box::new(SqliteWarehouse::new(conn)?))
    }

    fn describe(&self) -> String {
        match &self.target {
            SqliteTarget::File(path) => format!("sqlite:{}", path.display()),
            SqliteTarget::Shared(_) => "sqlite::memory:".to_string(),
        }
    }
}

/// A `SQLite` session.
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteWarehouse {
    fn new(conn: Arc<Mutex<Connection>>) -> error::Result<Self> {
        let interrupt = {
            let guard = conn.lock().map_err(|_| WarehouseError::LockPoisoned)?;
            Arc::new(guard.get_interrupt_handle())
        };
        Ok(Self { conn, interrupt })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| WarehouseError::LockPoisoned)
    }
}

impl Warehouse for SqliteWarehouse {
    fn execute(&mut self, sql: &str) -> error::Result<u64> {
        let conn = self.lock_conn()?;
        let changed = conn
            .execute(sql, [])
            .map_err(|e| WarehouseError::statement(sql, e))?;
        Ok(changed as u64)
    }

    fn query(&mut self, sql: &str) -> error::Result<Vec<Row>> {
        let conn = self.lock_conn()?;
        query_rows(&conn, sql, true)
    }

    fn run_in_transaction(&mut self, statements: &[Statement]) -> error::Result<Vec<u64>> {
        let mut conn = self.lock_conn()?;
        // Write lock at BEGIN; contending writers wait on the busy timeout.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| WarehouseError::statement("BEGIN", e))?;

        let mut affected = Vec::with_capacity(statements.len());
        for statement in statements {
            let rows = match statement {
                Statement::Sql(sql) => tx
                    .execute(sql, [])
                    .map(|n| n as u64)
                    .map_err(|e| WarehouseError::statement(sql.as_str(), e))?,
                Statement::Copy(command) => copy_local(&tx, command)?,
            };
            affected.push(rows);
        }

        tx.commit()
            .map_err(|e| WarehouseError::statement("COMMIT", e))?;
        Ok(affected)
    }

    fn abort_handle(&self) -> Option<Arc<dyn AbortHandle>> {
        Some(Arc::new(SqliteAbort(Arc::clone(&self.interrupt))))
    }
}

struct SqliteAbort(Arc<InterruptHandle>);

impl AbortHandle for SqliteAbort {
    fn abort(&self) {
        self.0.interrupt();
    }
}

/// Run `sql` and collect its rows. With `read_only`, statements that could
/// write are rejected before they step.
fn query_rows(conn: &Connection, sql: &str, read_only: bool) -> error::Result<Vec<Row>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| WarehouseError::statement(sql, e))?;
    if read_only && !stmt.readonly() {
        return Err(WarehouseError::statement(
            sql,
            "read queries must not modify the database",
        ));
    }
    let column_count = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..column_count)
                .map(|i| row.get_ref(i).map(value_from_sql))
                .collect::<rusqlite::Result<Row>>()
        })
        .map_err(|e| WarehouseError::statement(sql, e))?;
    let collected = rows
        .collect::<rusqlite::Result<Vec<Row>>>()
        .map_err(|e| WarehouseError::statement(sql, e));
    collected
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

// ---------------------------------------------------------------------------
// Local bulk copy
// ---------------------------------------------------------------------------

fn copy_local(conn: &Connection, command: &CopyCommand) -> error::Result<u64> {
    let copy_error = |message: String| WarehouseError::Copy {
        sql: command.to_redacted_sql(),
        location: command.location.clone(),
        message,
    };

    if !command.options.json_paths.eq_ignore_ascii_case("auto") {
        return Err(copy_error(format!(
            "JSON paths '{}' not supported by the sqlite backend (only 'auto')",
            command.options.json_paths
        )));
    }

    let columns = table_columns(conn, &command.table)?;
    if columns.is_empty() {
        return Err(copy_error(format!("table '{}' does not exist", command.table)));
    }

    let files = source_files(local_path(&command.location)).map_err(copy_error)?;

    let column_list = columns
        .iter()
        .map(|c| crate::sql::quote_qualified(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        crate::sql::quote_qualified(&command.table)
    );
    let mut insert = conn
        .prepare(&insert_sql)
        .map_err(|e| WarehouseError::statement(insert_sql.as_str(), e))?;

    let mut loaded = 0u64;
    for file in &files {
        let content = std::fs::read_to_string(file)
            .map_err(|e| copy_error(format!("{}: {e}", file.display())))?;
        for object in serde_json::Deserializer::from_str(&content).into_iter::<serde_json::Value>()
        {
            let object = object.map_err(|e| copy_error(format!("{}: {e}", file.display())))?;
            let fields = match object {
                serde_json::Value::Object(fields) => fields,
                other => {
                    return Err(copy_error(format!(
                        "{}: expected JSON objects, found {other}",
                        file.display()
                    )));
                }
            };
            let by_lower: HashMap<String, &serde_json::Value> = fields
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect();
            let row = columns.iter().map(|column| {
                by_lower
                    .get(&column.to_ascii_lowercase())
                    .map_or(SqlValue::Null, |v| value_to_sql(&Value::from_json(v)))
            });
            insert
                .execute(params_from_iter(row))
                .map_err(|e| copy_error(format!("{}: {e}", file.display())))?;
            loaded += 1;
        }
    }

    tracing::debug!(
        table = %command.table,
        location = %command.location,
        files = files.len(),
        rows = loaded,
        "Local copy complete"
    );
    Ok(loaded)
}

fn table_columns(conn: &Connection, table: &str) -> error::Result<Vec<String>> {
    let sql = format!("PRAGMA table_info({})", crate::sql::quote_qualified(table));
    let rows = query_rows(conn, &sql, false)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.get(1) {
            Some(Value::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect())
}

fn local_path(location: &str) -> &Path {
    Path::new(location.strip_prefix("file://").unwrap_or(location))
}

/// Every regular file under `path`, sorted for deterministic load order.
fn source_files(path: &Path) -> Result<Vec<PathBuf>, String> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(format!("{} does not exist", path.display()));
    }

    let mut files = Vec::new();
    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            std::fs::read_dir(&dir).map_err(|e| format!("{}: {e}", dir.display()))?;
        for entry in entries {
            let entry = entry.map_err(|e| format!("{}: {e}", dir.display()))?;
            let entry_path = entry.path();
            if entry_path.is_dir() {
                pending.push(entry_path);
            } else if entry_path.is_file() {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    Ok(files)
}
