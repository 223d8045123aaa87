//! Execution Result - outcome of one executor call

use crate::corrector::QueryPlan;
use crate::database::{RawRows, Value};
use crate::error::{ErrorKind, GuardianError, UserFacing};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Query ran and returned at least one row
    Rows,
    /// Query ran and returned no rows. A success, not an error.
    EmptyResult,
    /// Rejected before any database round-trip
    Rejected,
    /// Reached the database and failed
    Failed,
}

/// Failure detail carried by an unsuccessful result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: ErrorKind,
    /// Technical message for logs, including any raw database diagnostic
    pub technical_message: String,
    pub reason: String,
    pub suggestion: String,
    /// Database attempts made before giving up
    pub attempts: u32,
}

impl ExecutionFailure {
    pub fn new(kind: ErrorKind, technical_message: impl Into<String>, user: UserFacing, attempts: u32) -> Self {
        Self {
            kind,
            technical_message: technical_message.into(),
            reason: user.reason,
            suggestion: user.suggestion,
            attempts,
        }
    }

    pub fn from_error(error: &GuardianError, attempts: u32) -> Self {
        Self::new(error.kind(), error.to_string(), error.user_facing(), attempts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub status: ExecutionStatus,
    pub rows: Vec<Vec<Value>>,
    pub column_names: Vec<String>,
    pub row_count: usize,
    pub failure: Option<ExecutionFailure>,
    /// Retries consumed (attempts after the first)
    pub retry_count: u32,
    /// Database round-trips made
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub schema_validated: bool,
    pub plan: QueryPlan,
}

impl ExecutionResult {
    pub fn succeeded(plan: QueryPlan, raw: RawRows, attempts: u32, elapsed_ms: u64) -> Self {
        let row_count = raw.rows.len();
        Self {
            success: true,
            status: if row_count == 0 {
                ExecutionStatus::EmptyResult
            } else {
                ExecutionStatus::Rows
            },
            rows: raw.rows,
            column_names: raw.columns,
            row_count,
            failure: None,
            retry_count: attempts.saturating_sub(1),
            attempts,
            elapsed_ms,
            schema_validated: true,
            plan,
        }
    }

    /// Schema rejection: zero round-trips, `schema_validated = false`
    pub fn rejected(plan: QueryPlan, error: &GuardianError, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            status: ExecutionStatus::Rejected,
            rows: Vec::new(),
            column_names: Vec::new(),
            row_count: 0,
            failure: Some(ExecutionFailure::from_error(error, 0)),
            retry_count: 0,
            attempts: 0,
            elapsed_ms,
            schema_validated: false,
            plan,
        }
    }

    pub fn failed(plan: QueryPlan, failure: ExecutionFailure, elapsed_ms: u64) -> Self {
        let attempts = failure.attempts;
        Self {
            success: false,
            status: ExecutionStatus::Failed,
            rows: Vec::new(),
            column_names: Vec::new(),
            row_count: 0,
            failure: Some(failure),
            retry_count: attempts.saturating_sub(1),
            attempts,
            elapsed_ms,
            schema_validated: true,
            plan,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status == ExecutionStatus::EmptyResult
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.technical_message.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First-row value of a column, as a number
    pub fn scalar(&self, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.first()?.get(idx)?.as_f64()
    }

    /// Rows as JSON objects keyed by column name
    pub fn rows_as_json(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = self
                    .column_names
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), serde_json::to_value(v).unwrap_or(serde_json::Value::Null)))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rows_is_a_distinct_success() {
        let raw = RawRows {
            columns: vec!["total".into()],
            rows: vec![],
        };
        let result = ExecutionResult::succeeded(QueryPlan::default(), raw, 1, 3);
        assert!(result.success);
        assert!(result.is_empty());
        assert_eq!(result.error_kind(), None);
        assert_eq!(result.column_names, vec!["total"]);
    }

    #[test]
    fn test_rejection_has_no_attempts() {
        let err = GuardianError::ColumnNotFound {
            columns: vec!["t.c".into()],
        };
        let result = ExecutionResult::rejected(QueryPlan::default(), &err, 0);
        assert!(!result.schema_validated);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.error_kind(), Some(ErrorKind::ColumnNotFound));
    }

    #[test]
    fn test_scalar_and_json_rows() {
        let raw = RawRows {
            columns: vec!["region".into(), "total".into()],
            rows: vec![vec![Value::Text("north".into()), Value::Float(12.5)]],
        };
        let result = ExecutionResult::succeeded(QueryPlan::default(), raw, 2, 10);
        assert_eq!(result.retry_count, 1);
        assert_eq!(result.scalar("TOTAL"), Some(12.5));
        assert_eq!(result.rows_as_json()[0]["region"], "north");
    }
}
