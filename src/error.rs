use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardianError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Table not found: {table}")]
    TableNotFound {
        table: String,
        suggestion: Option<String>,
    },

    #[error("Column(s) not found: {}", columns.join(", "))]
    ColumnNotFound { columns: Vec<String> },

    #[error("Only single SELECT statements may be executed: {0}")]
    ReadOnlyViolation(String),

    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("No metric computed: {0}")]
    MetricComputation(String),

    #[error("Narrative error: {0}")]
    Narrative(String),

    #[error("Catalog cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for GuardianError {
    fn from(err: rusqlite::Error) -> Self {
        GuardianError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuardianError>;

/// Machine-readable error kind shared by errors and failed execution results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    CatalogUnavailable,
    UnknownTable,
    TableNotFound,
    ColumnNotFound,
    ReadOnlyViolation,
    SqlSyntaxError,
    TransientConnectionError,
    ExecutionTimeout,
    ExecutionError,
    MetricComputationError,
    NarrativeError,
    CacheError,
    ConfigError,
}

impl ErrorKind {
    /// Whether retrying the same statement can change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TransientConnectionError)
    }

    /// Kinds raised before any database round-trip.
    pub fn is_schema_rejection(&self) -> bool {
        matches!(
            self,
            ErrorKind::CatalogUnavailable
                | ErrorKind::UnknownTable
                | ErrorKind::TableNotFound
                | ErrorKind::ColumnNotFound
                | ErrorKind::ReadOnlyViolation
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Short reason + suggestion pair shown to end users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacing {
    pub reason: String,
    pub suggestion: String,
}

impl UserFacing {
    pub fn new(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }
}

impl GuardianError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardianError::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            GuardianError::UnknownTable(_) => ErrorKind::UnknownTable,
            GuardianError::TableNotFound { .. } => ErrorKind::TableNotFound,
            GuardianError::ColumnNotFound { .. } => ErrorKind::ColumnNotFound,
            GuardianError::ReadOnlyViolation(_) => ErrorKind::ReadOnlyViolation,
            GuardianError::SqlSyntax(_) => ErrorKind::SqlSyntaxError,
            GuardianError::Execution(_) => ErrorKind::ExecutionError,
            GuardianError::MetricComputation(_) => ErrorKind::MetricComputationError,
            GuardianError::Narrative(_) => ErrorKind::NarrativeError,
            GuardianError::Cache(_) => ErrorKind::CacheError,
            GuardianError::Config(_) => ErrorKind::ConfigError,
            GuardianError::Io(_) => ErrorKind::ExecutionError,
            GuardianError::Json(_) => ErrorKind::ExecutionError,
        }
    }

    pub fn user_facing(&self) -> UserFacing {
        match self {
            GuardianError::CatalogUnavailable(_) => UserFacing::new(
                "The database schema could not be loaded.",
                "Check that the database is reachable and try again.",
            ),
            GuardianError::UnknownTable(table) => UserFacing::new(
                format!("The table '{}' is not part of this database.", table),
                "Ask about one of the available tables.",
            ),
            GuardianError::TableNotFound { table, suggestion } => UserFacing::new(
                format!("The query refers to a table '{}' that does not exist.", table),
                match suggestion {
                    Some(s) => format!("Did you mean '{}'?", s),
                    None => "Rephrase the question using the available tables.".to_string(),
                },
            ),
            GuardianError::ColumnNotFound { columns } => UserFacing::new(
                format!("The query refers to unknown column(s): {}.", columns.join(", ")),
                "Rephrase the question using the available columns.",
            ),
            GuardianError::ReadOnlyViolation(_) => UserFacing::new(
                "Only read-only questions can be answered.",
                "Ask a question that reads data instead of changing it.",
            ),
            GuardianError::SqlSyntax(_) => UserFacing::new(
                "The generated query was not valid SQL.",
                "Try rephrasing the question more specifically.",
            ),
            GuardianError::Execution(_) | GuardianError::Io(_) | GuardianError::Json(_) => {
                UserFacing::new(
                    "The query could not be executed.",
                    "Try again later or simplify the question.",
                )
            }
            GuardianError::MetricComputation(_) => UserFacing::new(
                "The requested metric could not be computed from this result.",
                "The raw result is shown instead.",
            ),
            GuardianError::Narrative(_) => UserFacing::new(
                "A summary of the result could not be produced.",
                "Review the raw result directly.",
            ),
            GuardianError::Cache(_) => UserFacing::new(
                "The local schema cache could not be used.",
                "The schema will be loaded from the database instead.",
            ),
            GuardianError::Config(_) => UserFacing::new(
                "The service is not configured correctly.",
                "Check the connection settings.",
            ),
        }
    }
}
