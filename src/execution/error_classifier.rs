//! Error Classifier
//!
//! Classifies raw database failures into the execution taxonomy. SQLSTATE codes
//! win when the driver reports one; message patterns cover everything else.

use crate::database::DatabaseError;
use crate::error::{ErrorKind, UserFacing};
use serde::{Deserialize, Serialize};

/// A classified database failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Raw database diagnostic
    pub technical_message: String,
    pub user_facing: UserFacing,
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "connection refused",
    "server has gone away",
    "lost connection",
    "connection reset",
    "broken pipe",
    "could not connect",
    "connection closed",
    "terminating connection",
    "pool timed out",
    "database is locked",
    "timed out",
];

pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &DatabaseError) -> ClassifiedError {
        let kind = self.classify_kind(error);
        ClassifiedError {
            kind,
            technical_message: error.message.clone(),
            user_facing: Self::describe(kind, &error.message),
        }
    }

    pub fn classify_kind(&self, error: &DatabaseError) -> ErrorKind {
        if error.connection_failure {
            return ErrorKind::TransientConnectionError;
        }

        if let Some(code) = error.code.as_deref() {
            match code {
                "42601" => return ErrorKind::SqlSyntaxError,
                "42P01" => return ErrorKind::TableNotFound,
                "42703" => return ErrorKind::ColumnNotFound,
                "57P01" | "57P02" | "57P03" => return ErrorKind::TransientConnectionError,
                c if c.starts_with("08") => return ErrorKind::TransientConnectionError,
                _ => {}
            }
        }

        let msg = error.message.to_lowercase();

        if TRANSIENT_PATTERNS.iter().any(|p| msg.contains(p)) {
            return ErrorKind::TransientConnectionError;
        }

        if msg.contains("syntax error") || msg.contains("incomplete input") {
            return ErrorKind::SqlSyntaxError;
        }

        if msg.contains("no such column")
            || (msg.contains("column") && (msg.contains("does not exist") || msg.contains("not found")))
        {
            return ErrorKind::ColumnNotFound;
        }

        if msg.contains("no such table")
            || ((msg.contains("relation") || msg.contains("table"))
                && (msg.contains("does not exist") || msg.contains("not found")))
        {
            return ErrorKind::TableNotFound;
        }

        ErrorKind::ExecutionError
    }

    fn describe(kind: ErrorKind, message: &str) -> UserFacing {
        match kind {
            ErrorKind::SqlSyntaxError => UserFacing::new(
                format!("The generated query was not valid SQL ({}).", first_line(message)),
                "Try rephrasing the question more specifically.",
            ),
            ErrorKind::TableNotFound => UserFacing::new(
                "The query refers to a table the database no longer has.",
                "Refresh the schema catalog and ask again.",
            ),
            ErrorKind::ColumnNotFound => UserFacing::new(
                "The query refers to a column the database no longer has.",
                "Refresh the schema catalog and ask again.",
            ),
            ErrorKind::TransientConnectionError => UserFacing::new(
                "The database connection failed.",
                "Try again in a moment.",
            ),
            _ => UserFacing::new(
                "The query could not be executed.",
                "Try again later or simplify the question.",
            ),
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message).trim()
}
