//! Database boundary
//!
//! The core only ever issues read statements through the `Database` trait.
//! Connection configuration lives outside the core; `connect` picks the backend
//! from the URL scheme.

pub mod postgres;
pub mod sqlite;

use crate::catalog::ColumnSchema;
use crate::error::{GuardianError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use postgres::PostgresDatabase;
pub use sqlite::SqliteDatabase;

/// A single cell value returned by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric view of the cell. Text cells count when they parse as a number
    /// (NUMERIC columns often arrive as text).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Rows exactly as the database returned them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Raw database failure, before classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DatabaseError {
    /// SQLSTATE (or engine error code) when the driver reported one
    pub code: Option<String>,
    pub message: String,
    /// The driver lost or could not establish the connection
    pub connection_failure: bool,
}

impl DatabaseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            connection_failure: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            connection_failure: true,
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// SQL dialect spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Expression extracting the calendar year from a date column.
    pub fn year_expr(&self, column: &str) -> String {
        match self {
            Dialect::Postgres => format!("EXTRACT(YEAR FROM {})", column),
            Dialect::Sqlite => format!("CAST(strftime('%Y', {}) AS INTEGER)", column),
        }
    }

    pub fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        match self {
            Dialect::Postgres => Box::new(sqlparser::dialect::PostgreSqlDialect {}),
            Dialect::Sqlite => Box::new(sqlparser::dialect::SQLiteDialect {}),
        }
    }
}

/// Database contract used by the catalog and the executor.
#[async_trait]
pub trait Database: Send + Sync {
    /// Logical database name; keys the local catalog cache.
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Run a read statement and return every row.
    async fn query(&self, sql: &str) -> DbResult<RawRows>;

    /// Base tables visible to the connection, in name order.
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Columns of a table, in ordinal order.
    async fn describe_table(&self, table: &str) -> DbResult<Vec<ColumnSchema>>;
}

/// Open a backend from a connection URL.
///
/// `postgres://` and `postgresql://` use the sqlx pool; `sqlite:` (or a bare
/// path) opens a local file, `sqlite::memory:` an in-memory database.
pub async fn connect(url: &str, database_name: Option<&str>) -> Result<Arc<dyn Database>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let name = database_name
            .map(str::to_string)
            .unwrap_or_else(|| database_name_from_url(url));
        let db = PostgresDatabase::connect(url, &name)
            .await
            .map_err(|e| GuardianError::CatalogUnavailable(e.to_string()))?;
        return Ok(Arc::new(db));
    }

    let path = url.strip_prefix("sqlite:").unwrap_or(url);
    let path = path.trim_start_matches("//");
    let db = if path == ":memory:" {
        SqliteDatabase::open_in_memory(database_name.unwrap_or("memory"))
    } else {
        let name = database_name.map(str::to_string).unwrap_or_else(|| {
            std::path::Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string())
        });
        SqliteDatabase::open(path, &name)
    }
    .map_err(|e| GuardianError::Config(format!("Failed to open SQLite database: {}", e)))?;
    Ok(Arc::new(db))
}

fn database_name_from_url(url: &str) -> String {
    url.rsplit('/')
        .next()
        .and_then(|tail| tail.split('?').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("postgres")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_cells_parse_as_numbers() {
        assert_eq!(Value::Text(" 3996499.31 ".into()).as_f64(), Some(3996499.31));
        assert_eq!(Value::Text("north".into()).as_f64(), None);
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_database_name_from_url() {
        assert_eq!(
            database_name_from_url("postgres://u:p@localhost:5432/retail?sslmode=disable"),
            "retail"
        );
        assert_eq!(database_name_from_url("postgres://localhost/"), "postgres");
    }

    #[test]
    fn test_year_expression_per_dialect() {
        assert_eq!(Dialect::Postgres.year_expr("sale_date"), "EXTRACT(YEAR FROM sale_date)");
        assert_eq!(
            Dialect::Sqlite.year_expr("sale_date"),
            "CAST(strftime('%Y', sale_date) AS INTEGER)"
        );
    }
}
