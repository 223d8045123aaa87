//! Read-only guard
//!
//! Only single read statements cross the database boundary.

use crate::database::Dialect;
use crate::error::{GuardianError, Result};
use sqlparser::ast::Statement;
use sqlparser::parser::Parser;
use tracing::debug;

pub fn ensure_read_only(sql: &str, dialect: Dialect) -> Result<()> {
    let parser_dialect = dialect.parser_dialect();
    match Parser::parse_sql(parser_dialect.as_ref(), sql) {
        Ok(statements) => match statements.as_slice() {
            [Statement::Query(_)] => Ok(()),
            [] => Err(GuardianError::ReadOnlyViolation("empty statement".to_string())),
            [_] => Err(GuardianError::ReadOnlyViolation(
                "statement is not a query".to_string(),
            )),
            many => Err(GuardianError::ReadOnlyViolation(format!(
                "{} statements in one request",
                many.len()
            ))),
        },
        Err(e) => {
            // Unparseable text goes to the database, whose diagnostic decides.
            debug!("sqlparser could not classify statement: {}", e);
            let first = sql
                .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
                .split(|c: char| !c.is_alphanumeric())
                .next()
                .unwrap_or("")
                .to_uppercase();
            if first == "SELECT" || first == "WITH" {
                Ok(())
            } else {
                Err(GuardianError::ReadOnlyViolation(format!(
                    "statement starts with '{}'",
                    first
                )))
            }
        }
    }
}
