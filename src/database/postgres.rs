//! PostgreSQL backend using sqlx

use super::{Database, DatabaseError, DbResult, Dialect, RawRows, Value};
use crate::catalog::ColumnSchema;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::info;

pub struct PostgresDatabase {
    pool: PgPool,
    name: String,
}

impl PostgresDatabase {
    /// Initialize the connection pool and check the connection
    pub async fn connect(database_url: &str, name: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!("Connected to PostgreSQL database '{}'", name);

        Ok(Self {
            pool,
            name: name.to_string(),
        })
    }

    pub fn from_pool(pool: PgPool, name: &str) -> Self {
        Self {
            pool,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, sql: &str) -> DbResult<RawRows> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => {
                // fetch_all gives no column metadata for an empty result
                let described = sqlx::Executor::describe(&self.pool, sql)
                    .await
                    .map_err(map_sqlx_error)?;
                described.columns().iter().map(|c| c.name().to_string()).collect()
            }
        };

        let rows = rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|idx| decode_cell(row, idx)).collect())
            .collect();

        Ok(RawRows { columns, rows })
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn describe_table(&self, table: &str) -> DbResult<Vec<ColumnSchema>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name, data_type::text AS data_type
            FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                Ok(ColumnSchema {
                    name: row.try_get("column_name").map_err(map_sqlx_error)?,
                    data_type: row.try_get("data_type").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }
}

fn decode_cell(row: &PgRow, idx: usize) -> Value {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    let decoded = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(idx).map(|v| Value::Int(v as i64)),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| Value::Int(v as i64)),
        "INT8" => row.try_get::<i64, _>(idx).map(Value::Int),
        "FLOAT4" => row.try_get::<f32, _>(idx).map(|v| Value::Float(v as f64)),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(Value::Float),
        "NUMERIC" => row.try_get::<sqlx::types::Decimal, _>(idx).map(|d| {
            let text = d.to_string();
            text.parse::<f64>().map(Value::Float).unwrap_or(Value::Text(text))
        }),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(idx)
            .map(|d| Value::Text(d.to_string())),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|d| Value::Text(d.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|d| Value::Text(d.to_rfc3339())),
        _ => row.try_get::<String, _>(idx).map(Value::Text),
    };

    decoded.unwrap_or(Value::Null)
}

fn map_sqlx_error(err: sqlx::Error) -> DatabaseError {
    match err {
        sqlx::Error::Database(db_err) => {
            let mut mapped = DatabaseError::new(db_err.message().to_string());
            if let Some(code) = db_err.code() {
                mapped = mapped.with_code(code.into_owned());
            }
            mapped
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DatabaseError::connection(err.to_string()),
        other => DatabaseError::new(other.to_string()),
    }
}
