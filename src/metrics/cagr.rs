//! In-database CAGR
//!
//! CAGR is never computed from fetched rows. A dedicated aggregate statement
//! joins a start-year sum to an end-year sum and evaluates the rate inside the
//! database, so the number is traceable to an executable statement.

use super::compute::is_period_or_identifier;
use super::{MetricInput, MetricKind, MetricResult, MetricValue};
use crate::catalog::TableSchema;
use crate::database::Dialect;
use crate::error::{GuardianError, Result};
use crate::execution::Executor;
use crate::validation::numbers::format_number;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

lazy_static! {
    static ref YEAR: Regex = Regex::new(r"\b(19\d{2}|20\d{2}|2100)\b").unwrap();
}

const VALUE_HINTS: &[&str] = &["amount", "revenue", "sales", "total", "value", "price"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CagrRequest {
    pub table: String,
    pub value_column: String,
    pub date_column: String,
    pub start_year: i32,
    pub end_year: i32,
}

impl CagrRequest {
    pub fn new(
        table: impl Into<String>,
        value_column: impl Into<String>,
        date_column: impl Into<String>,
        start_year: i32,
        end_year: i32,
    ) -> Result<Self> {
        if end_year <= start_year {
            return Err(GuardianError::MetricComputation(format!(
                "CAGR needs an end year after the start year ({} -> {})",
                start_year, end_year
            )));
        }
        Ok(Self {
            table: table.into(),
            value_column: value_column.into(),
            date_column: date_column.into(),
            start_year,
            end_year,
        })
    }

    /// Years from the question (earliest and latest mentioned), columns from
    /// the table schema.
    pub fn infer(question: &str, table: &TableSchema) -> Result<Self> {
        let years: Vec<i32> = YEAR
            .find_iter(question)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        let (Some(&start), Some(&end)) = (years.iter().min(), years.iter().max()) else {
            return Err(GuardianError::MetricComputation(
                "CAGR needs a start and an end year in the question".to_string(),
            ));
        };

        let measures: Vec<_> = table
            .columns
            .iter()
            .filter(|c| c.is_numeric() && !is_period_or_identifier(&c.name))
            .collect();
        let value_column = measures
            .iter()
            .find(|c| {
                let name = c.name.to_lowercase();
                VALUE_HINTS.iter().any(|h| name.contains(h))
            })
            .or_else(|| measures.first())
            .ok_or_else(|| {
                GuardianError::MetricComputation(format!("no numeric value column in '{}'", table.name))
            })?;

        let date_column = table
            .columns
            .iter()
            .find(|c| c.is_temporal())
            .or_else(|| table.columns.iter().find(|c| c.name.to_lowercase().contains("date")))
            .ok_or_else(|| {
                GuardianError::MetricComputation(format!("no date column in '{}'", table.name))
            })?;

        Self::new(&table.name, &value_column.name, &date_column.name, start, end)
    }

    pub fn sql(&self, dialect: Dialect) -> String {
        let value = format!("{}.{}", self.table, self.value_column);
        let year = dialect.year_expr(&format!("{}.{}", self.table, self.date_column));
        let years = self.end_year - self.start_year;
        format!(
            "WITH start_period AS (SELECT SUM({value}) AS start_value FROM {table} WHERE {year} = {start}), \
             end_period AS (SELECT SUM({value}) AS end_value FROM {table} WHERE {year} = {end}) \
             SELECT round(CAST((power(end_value * 1.0 / NULLIF(start_value, 0), 1.0 / {years}) - 1) * 100 AS NUMERIC), 2) AS cagr, \
             {start} AS start_year, {end} AS end_year, start_value, end_value \
             FROM start_period CROSS JOIN end_period",
            value = value,
            table = self.table,
            year = year,
            start = self.start_year,
            end = self.end_year,
            years = years,
        )
    }
}

/// Run the CAGR statement through the validated executor path.
pub async fn compute_cagr(executor: &Executor, request: &CagrRequest) -> Result<MetricResult> {
    let sql = request.sql(executor.corrector().dialect());
    let result = executor.execute(&sql).await;

    if let Some(failure) = &result.failure {
        return Err(GuardianError::MetricComputation(format!(
            "CAGR query failed ({}): {}",
            failure.kind, failure.technical_message
        )));
    }

    let missing = |what: &str| {
        GuardianError::MetricComputation(format!(
            "no {} for {} between {} and {}",
            what, request.table, request.start_year, request.end_year
        ))
    };
    let cagr = result.scalar("cagr").ok_or_else(|| missing("CAGR"))?;
    let start_value = result.scalar("start_value").ok_or_else(|| missing("start value"))?;
    let end_value = result.scalar("end_value").ok_or_else(|| missing("end value"))?;

    info!(
        "CAGR {}.{} {}-{}: {}",
        request.table, request.value_column, request.start_year, request.end_year, cagr
    );

    Ok(MetricResult {
        kind: MetricKind::Cagr,
        value: MetricValue::Scalar(cagr),
        formula: format!(
            "round((power({} / {}, 1.0 / ({} - {})) - 1) * 100, 2)",
            format_number(end_value),
            format_number(start_value),
            request.end_year,
            request.start_year
        ),
        inputs: vec![
            MetricInput::new("start_value", start_value),
            MetricInput::new("end_value", end_value),
            MetricInput::new("start_year", request.start_year as f64),
            MetricInput::new("end_year", request.end_year as f64),
        ],
        columns: vec![request.value_column.clone(), request.date_column.clone()],
        sql: Some(result.plan.corrected_sql),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnSchema;

    fn sales() -> TableSchema {
        TableSchema::new(
            "sales",
            vec![
                ColumnSchema::new("sale_id", "integer"),
                ColumnSchema::new("store_id", "integer"),
                ColumnSchema::new("quantity", "integer"),
                ColumnSchema::new("amount", "numeric"),
                ColumnSchema::new("sale_date", "date"),
            ],
        )
    }

    #[test]
    fn test_infer_from_question() {
        let req = CagrRequest::infer("CAGR of sales between 2024 and 2021?", &sales()).unwrap();
        assert_eq!(req.start_year, 2021);
        assert_eq!(req.end_year, 2024);
        assert_eq!(req.value_column, "amount");
        assert_eq!(req.date_column, "sale_date");
    }

    #[test]
    fn test_infer_needs_two_years() {
        assert!(CagrRequest::infer("CAGR of sales in 2024", &sales()).is_err());
        assert!(CagrRequest::infer("CAGR of sales", &sales()).is_err());
    }

    #[test]
    fn test_sql_per_dialect() {
        let req = CagrRequest::new("sales", "amount", "sale_date", 2023, 2024).unwrap();
        let pg = req.sql(Dialect::Postgres);
        assert!(pg.contains("EXTRACT(YEAR FROM sales.sale_date) = 2023"));
        assert!(pg.contains("1.0 / 1)"));
        let lite = req.sql(Dialect::Sqlite);
        assert!(lite.contains("CAST(strftime('%Y', sales.sale_date) AS INTEGER) = 2024"));
    }
}
