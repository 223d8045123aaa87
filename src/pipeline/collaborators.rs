//! Upstream collaborators
//!
//! SQL and narrative generators are untrusted producers of candidate strings.
//! The pipeline validates whatever they return.

use super::context::SchemaContext;
use crate::error::Result;
use crate::execution::ExecutionResult;
use crate::metrics::{MetricResult, MetricValue};
use crate::validation::format_number;
use async_trait::async_trait;
use itertools::Itertools;

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str, context: &SchemaContext) -> Result<String>;
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate_narrative(
        &self,
        question: &str,
        result: &ExecutionResult,
        metric: Option<&MetricResult>,
    ) -> Result<String>;
}

/// Returns the same statement for every question
pub struct FixedSql(pub String);

#[async_trait]
impl SqlGenerator for FixedSql {
    async fn generate_sql(&self, _question: &str, _context: &SchemaContext) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Returns the same narrative for every result
pub struct FixedNarrative(pub String);

#[async_trait]
impl NarrativeGenerator for FixedNarrative {
    async fn generate_narrative(
        &self,
        _question: &str,
        _result: &ExecutionResult,
        _metric: Option<&MetricResult>,
    ) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Plain summary that only quotes numbers taken from the result and metric.
pub struct SummaryNarrative;

#[async_trait]
impl NarrativeGenerator for SummaryNarrative {
    async fn generate_narrative(
        &self,
        _question: &str,
        result: &ExecutionResult,
        metric: Option<&MetricResult>,
    ) -> Result<String> {
        if result.is_empty() {
            return Ok("No data matched the question.".to_string());
        }

        let mut text = format!(
            "The query returned {} row(s) with columns {}.",
            result.row_count,
            result.column_names.join(", ")
        );
        if let Some(metric) = metric {
            let value = match &metric.value {
                MetricValue::Scalar(v) => format_number(*v),
                MetricValue::PerRow(vs) => vs.iter().map(|v| format_number(*v)).join(", "),
            };
            text.push_str(&format!(" The {} metric is {}.", metric.kind, value));
        }
        Ok(text)
    }
}
