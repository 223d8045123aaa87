//! Metric Engine
//!
//! Derived business metrics. growth, ratio, share and aov use fixed formulas
//! over the fetched rows; CAGR runs as its own aggregate statement in the
//! database. Every result carries its formula and the literal inputs used.

pub mod cagr;
pub mod compute;
pub mod detect;

pub use cagr::{compute_cagr, CagrRequest};
pub use detect::detect_requested_metrics;

use crate::error::{GuardianError, Result};
use crate::execution::{ExecutionResult, Executor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Growth,
    Ratio,
    Share,
    Aov,
    Cagr,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Growth => "growth",
            MetricKind::Ratio => "ratio",
            MetricKind::Share => "share",
            MetricKind::Aov => "aov",
            MetricKind::Cagr => "cagr",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "growth" => Ok(MetricKind::Growth),
            "ratio" => Ok(MetricKind::Ratio),
            "share" => Ok(MetricKind::Share),
            "aov" => Ok(MetricKind::Aov),
            "cagr" => Ok(MetricKind::Cagr),
            other => Err(format!("unknown metric '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRequest {
    pub kind: MetricKind,
    /// Explicit columns; empty means the column heuristics decide
    #[serde(default)]
    pub target_columns: Vec<String>,
}

impl MetricRequest {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            target_columns: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.target_columns = columns;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInput {
    pub name: String,
    pub value: f64,
}

impl MetricInput {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    PerRow(Vec<f64>),
}

impl MetricValue {
    pub fn values(&self) -> Vec<f64> {
        match self {
            MetricValue::Scalar(v) => vec![*v],
            MetricValue::PerRow(vs) => vs.clone(),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::PerRow(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub kind: MetricKind,
    pub value: MetricValue,
    pub formula: String,
    pub inputs: Vec<MetricInput>,
    /// Result columns the metric was computed from
    pub columns: Vec<String>,
    /// Statement that produced the value, for in-database metrics
    pub sql: Option<String>,
}

impl MetricResult {
    /// Every number this metric legitimately contributes to a narrative
    pub fn numbers(&self) -> Vec<f64> {
        let mut numbers = self.value.values();
        numbers.extend(self.inputs.iter().map(|i| i.value));
        numbers
    }
}

pub struct MetricEngine {
    executor: Arc<Executor>,
}

impl MetricEngine {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }

    /// The metric to apply for a question: the first detected kind.
    pub fn request_for(&self, question: &str) -> Option<MetricRequest> {
        let kinds = detect_requested_metrics(question);
        debug!("Detected metrics {:?} in question", kinds);
        kinds.first().copied().map(MetricRequest::new)
    }

    pub async fn compute(
        &self,
        request: &MetricRequest,
        question: &str,
        result: &ExecutionResult,
    ) -> Result<MetricResult> {
        let metric = match request.kind {
            MetricKind::Growth => compute::growth(result, &request.target_columns),
            MetricKind::Ratio => compute::ratio(result, &request.target_columns),
            MetricKind::Share => compute::share(result, &request.target_columns),
            MetricKind::Aov => compute::aov(result, &request.target_columns),
            MetricKind::Cagr => {
                let cagr_request = self.cagr_request(request, question, result)?;
                self.cagr(&cagr_request).await
            }
        }?;
        info!("Computed {} metric: {}", metric.kind, metric.formula);
        Ok(metric)
    }

    pub async fn cagr(&self, request: &CagrRequest) -> Result<MetricResult> {
        compute_cagr(&self.executor, request).await
    }

    /// CAGR over the primary table of the executed query
    fn cagr_request(
        &self,
        request: &MetricRequest,
        question: &str,
        result: &ExecutionResult,
    ) -> Result<CagrRequest> {
        let table = result
            .plan
            .referenced_tables
            .first()
            .ok_or_else(|| GuardianError::MetricComputation("no table to compute CAGR over".to_string()))?;
        let snapshot = self
            .executor
            .corrector()
            .catalog()
            .snapshot()
            .ok_or_else(|| GuardianError::MetricComputation("schema catalog not loaded".to_string()))?;
        let schema = snapshot
            .table(table)
            .ok_or_else(|| GuardianError::MetricComputation(format!("table '{}' not in catalog", table)))?;

        let mut cagr_request = CagrRequest::infer(question, schema)?;
        if let [value, date, ..] = request.target_columns.as_slice() {
            cagr_request.value_column = value.clone();
            cagr_request.date_column = date.clone();
        }
        Ok(cagr_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_numbers_include_inputs() {
        let metric = MetricResult {
            kind: MetricKind::Aov,
            value: MetricValue::Scalar(100.0),
            formula: "1000 / 10 = 100".to_string(),
            inputs: vec![MetricInput::new("amount", 1000.0), MetricInput::new("orders", 10.0)],
            columns: vec!["amount".to_string(), "orders".to_string()],
            sql: None,
        };
        assert_eq!(metric.numbers(), vec![100.0, 1000.0, 10.0]);
    }

    #[test]
    fn test_metric_value_serializes_plainly() {
        assert_eq!(serde_json::to_string(&MetricValue::Scalar(2.85)).unwrap(), "2.85");
        assert_eq!(
            serde_json::to_string(&MetricValue::PerRow(vec![16.67, 50.0])).unwrap(),
            "[16.67,50.0]"
        );
        assert_eq!(serde_json::to_string(&MetricKind::Cagr).unwrap(), "\"cagr\"");
    }

    #[test]
    fn test_metric_kind_parses_names() {
        assert_eq!("AOV".parse::<MetricKind>(), Ok(MetricKind::Aov));
        assert_eq!(" share ".parse::<MetricKind>(), Ok(MetricKind::Share));
        assert!("median".parse::<MetricKind>().is_err());
    }
}
