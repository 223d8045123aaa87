#![allow(dead_code)]

use async_trait::async_trait;
use sql_guardian::catalog::{ColumnSchema, SchemaCatalog, TableSchema};
use sql_guardian::corrector::QueryCorrector;
use sql_guardian::database::{DatabaseError, DbResult, Dialect, RawRows, SqliteDatabase, Value};
use sql_guardian::database::Database;
use sql_guardian::execution::{Executor, RetryPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process database with a fixed catalog and scripted query behaviour.
pub struct ScriptedDatabase {
    tables: Vec<TableSchema>,
    rows: RawRows,
    transient_failures: AtomicUsize,
    query_calls: AtomicUsize,
    query_delay: Option<Duration>,
}

impl ScriptedDatabase {
    pub fn new(tables: Vec<TableSchema>, rows: RawRows) -> Self {
        Self {
            tables,
            rows,
            transient_failures: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            query_delay: None,
        }
    }

    /// The next `n` queries fail with a dropped connection
    pub fn failing_first(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Database for ScriptedDatabase {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, _sql: &str) -> DbResult<RawRows> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.query_delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DatabaseError::connection("server closed the connection unexpectedly"));
        }
        Ok(self.rows.clone())
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn describe_table(&self, table: &str) -> DbResult<Vec<ColumnSchema>> {
        self.tables
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| DatabaseError::new(format!("relation \"{}\" does not exist", table)))
    }
}

pub fn orders_table() -> TableSchema {
    TableSchema::new(
        "orders",
        vec![
            ColumnSchema::new("order_id", "integer"),
            ColumnSchema::new("customer_id", "integer"),
            ColumnSchema::new("total_amount", "numeric"),
        ],
    )
}

pub fn one_row() -> RawRows {
    RawRows {
        columns: vec!["total_amount".to_string()],
        rows: vec![vec![Value::Float(980000.0)]],
    }
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(5))
}

pub fn executor_for(db: Arc<dyn Database>, policy: RetryPolicy) -> Executor {
    let catalog = Arc::new(SchemaCatalog::new(Arc::clone(&db)));
    let corrector = Arc::new(QueryCorrector::new(catalog, db.dialect()));
    Executor::new(db, corrector).with_policy(policy)
}

/// Retail fixture: yearly sales for CAGR, plus regional and order tables.
pub fn retail_sqlite() -> Arc<SqliteDatabase> {
    let db = SqliteDatabase::open_in_memory("retail").expect("in-memory sqlite");
    db.execute_batch(
        "CREATE TABLE sales (sale_id INTEGER, region TEXT, amount REAL, sale_date DATE);
         INSERT INTO sales VALUES
           (1, 'north', 1996499.31, '2023-02-14'),
           (2, 'south', 2000000.00, '2023-09-30'),
           (3, 'north', 2110315.23, '2024-03-01'),
           (4, 'south', 2000000.00, '2024-11-20');
         CREATE TABLE monthly_revenue (month TEXT, revenue REAL);
         INSERT INTO monthly_revenue VALUES ('2024-01', 1000), ('2024-02', 1050), ('2024-03', 1100);
         CREATE TABLE regional_sales (region TEXT, sales REAL);
         INSERT INTO regional_sales VALUES ('east', 100), ('north', 200), ('west', 300);
         CREATE TABLE store_orders (store TEXT, total_amount REAL, order_count INTEGER);
         INSERT INTO store_orders VALUES ('a', 600, 6), ('b', 400, 4);",
    )
    .expect("fixture schema");
    Arc::new(db)
}
