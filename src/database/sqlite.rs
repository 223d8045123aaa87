//! SQLite backend using rusqlite
//!
//! Used for local database files and in tests. A deterministic `power` scalar
//! function is registered so aggregate metric statements evaluate the same way
//! they do on PostgreSQL.

use super::{Database, DatabaseError, DbResult, Dialect, RawRows, Value};
use crate::catalog::ColumnSchema;
use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, InterruptHandle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    name: String,
}

/// Interrupts the running statement if the awaiting future is dropped before
/// the blocking work finished (an attempt timeout, for instance).
struct InterruptOnDrop {
    handle: Arc<InterruptHandle>,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            debug!("Interrupting abandoned SQLite statement");
            self.handle.interrupt();
        }
    }
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>, name: &str) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(path)?, name)
    }

    pub fn open_in_memory(name: &str) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, name)
    }

    fn from_connection(conn: Connection, name: &str) -> rusqlite::Result<Self> {
        conn.create_scalar_function(
            "power",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let base: Option<f64> = ctx.get(0)?;
                let exponent: Option<f64> = ctx.get(1)?;
                Ok(match (base, exponent) {
                    (Some(b), Some(e)) => Some(b.powf(e)),
                    _ => None,
                })
            },
        )?;

        Ok(Self {
            interrupt: Arc::new(conn.get_interrupt_handle()),
            conn: Arc::new(Mutex::new(conn)),
            name: name.to_string(),
        })
    }

    /// Run setup statements (fixtures, local loading). Not used by the core.
    pub fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(sql)
    }

    /// Run rusqlite work on the blocking pool so the caller's future stays
    /// cancellable.
    async fn run_blocking<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let mut guard = InterruptOnDrop {
            handle: Arc::clone(&self.interrupt),
            armed: true,
        };
        let outcome = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            work(&conn)
        })
        .await;
        guard.armed = false;
        outcome.map_err(|e| DatabaseError::new(format!("SQLite worker failed: {}", e)))?
    }
}

fn read_rows(conn: &Connection, sql: &str) -> DbResult<RawRows> {
    let mut stmt = conn.prepare(sql).map_err(map_sqlite_error)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).map_err(map_sqlite_error)?;
    while let Some(row) = cursor.next().map_err(map_sqlite_error)? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            let cell = match row.get_ref(idx).map_err(map_sqlite_error)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Int(i),
                ValueRef::Real(f) => Value::Float(f),
                ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
                ValueRef::Blob(_) => Value::Null,
            };
            cells.push(cell);
        }
        rows.push(cells);
    }

    Ok(RawRows { columns, rows })
}

#[async_trait]
impl Database for SqliteDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn query(&self, sql: &str) -> DbResult<RawRows> {
        let sql = sql.to_string();
        self.run_blocking(move |conn| read_rows(conn, &sql)).await
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.run_blocking(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )
                .map_err(map_sqlite_error)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_sqlite_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sqlite_error)?;
            Ok(names)
        })
        .await
    }

    async fn describe_table(&self, table: &str) -> DbResult<Vec<ColumnSchema>> {
        let pragma = format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\""));
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(&pragma).map_err(map_sqlite_error)?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnSchema {
                        name: row.get(1)?,
                        data_type: row.get::<_, String>(2)?.to_lowercase(),
                    })
                })
                .map_err(map_sqlite_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sqlite_error)?;
            Ok(columns)
        })
        .await
    }
}

fn map_sqlite_error(err: rusqlite::Error) -> DatabaseError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let text = message.clone().unwrap_or_else(|| failure.to_string());
            let code = format!("{:?}", failure.code);
            match failure.code {
                ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    DatabaseError::connection(text).with_code(code)
                }
                _ => DatabaseError::new(text).with_code(code),
            }
        }
        _ => DatabaseError::new(err.to_string()),
    }
}
