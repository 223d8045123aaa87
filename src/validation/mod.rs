//! Response Validator
//!
//! Checks every number in a candidate narrative against the numbers legitimately
//! present in the execution result and computed metrics. It only reports; what
//! to do with a failed report is the caller's decision.

pub mod numbers;

pub use numbers::{extract_numbers, format_number, NumberToken};

use crate::database::Value;
use crate::execution::ExecutionResult;
use crate::metrics::MetricResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Relative tolerance, also used as the absolute floor
    pub tolerance: f64,
    /// Integers in this range without a percent sign are read as calendar years
    pub min_year: i64,
    pub max_year: i64,
    /// Integers up to this value without a percent sign are read as counts
    pub small_integer_max: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            min_year: 1900,
            max_year: 2100,
            small_integer_max: 10,
        }
    }
}

/// Numbers a narrative may cite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowedNumbers {
    values: Vec<f64>,
}

impl AllowedNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: f64) {
        if value.is_finite() && !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = f64>) {
        for v in values {
            self.insert(v);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Canonical numeric strings
    pub fn canonical(&self) -> BTreeSet<String> {
        self.values.iter().map(|v| format_number(*v)).collect()
    }

    /// Closest allowed value and its distance
    pub fn nearest(&self, value: f64) -> Option<(f64, f64)> {
        self.values
            .iter()
            .map(|a| (*a, (a - value).abs()))
            .min_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedNumber {
    pub token: String,
    pub value: f64,
    pub nearest_allowed: Option<f64>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub narrative_text: String,
    pub allowed_numbers: BTreeSet<String>,
    pub flagged: Vec<FlaggedNumber>,
    /// Numeric tokens checked, exemptions included
    pub checked: usize,
    pub passed: bool,
}

pub struct ResponseValidator {
    config: ValidatorConfig,
}

impl ResponseValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Every numeric cell, numbers inside text cells, the row and column
    /// counts, and every number of every metric.
    pub fn allowed_numbers(&self, result: &ExecutionResult, metrics: &[MetricResult]) -> AllowedNumbers {
        let mut allowed = AllowedNumbers::new();
        for row in &result.rows {
            for cell in row {
                match cell {
                    Value::Text(text) => match cell.as_f64() {
                        Some(v) => allowed.insert(v),
                        None => allowed.extend(extract_numbers(text).into_iter().map(|t| t.value)),
                    },
                    other => {
                        if let Some(v) = other.as_f64() {
                            allowed.insert(v);
                        }
                    }
                }
            }
        }
        allowed.insert(result.row_count as f64);
        allowed.insert(result.column_names.len() as f64);
        for metric in metrics {
            allowed.extend(metric.numbers());
        }
        debug!("{} allowed numbers", allowed.len());
        allowed
    }

    pub fn validate(&self, narrative: &str, allowed: &AllowedNumbers) -> ValidationReport {
        let tokens = extract_numbers(narrative);
        let flagged: Vec<FlaggedNumber> = tokens
            .iter()
            .filter(|t| !self.is_exempt(t) && !self.matches(t, allowed))
            .map(|t| {
                let nearest = allowed.nearest(t.value);
                FlaggedNumber {
                    token: t.token.clone(),
                    value: t.value,
                    nearest_allowed: nearest.map(|(v, _)| v),
                    distance: nearest.map(|(_, d)| d),
                }
            })
            .collect();

        for f in &flagged {
            warn!(
                "Unsupported number '{}' in narrative (nearest allowed: {:?})",
                f.token, f.nearest_allowed
            );
        }

        ValidationReport {
            narrative_text: narrative.to_string(),
            allowed_numbers: allowed.canonical(),
            passed: flagged.is_empty(),
            checked: tokens.len(),
            flagged,
        }
    }

    pub fn validate_response(
        &self,
        narrative: &str,
        result: &ExecutionResult,
        metrics: &[MetricResult],
    ) -> ValidationReport {
        let allowed = self.allowed_numbers(result, metrics);
        self.validate(narrative, &allowed)
    }

    fn within_tolerance(&self, candidate: f64, allowed: f64) -> bool {
        (candidate - allowed).abs() <= (self.config.tolerance * allowed.abs()).max(self.config.tolerance)
    }

    /// Percent tokens also match the same value expressed as a fraction.
    /// Unsigned tokens match either sign: prose carries direction in words
    /// ("decreased by 3.5%") while the result holds -3.5.
    fn matches(&self, token: &NumberToken, allowed: &AllowedNumbers) -> bool {
        let mut candidates = vec![token.value];
        if token.percent {
            candidates.push(token.value / 100.0);
        }
        if !token.token.starts_with('-') {
            let negated: Vec<f64> = candidates.iter().map(|c| -c).collect();
            candidates.extend(negated);
        }
        candidates.into_iter().any(|c| {
            allowed
                .values
                .iter()
                .any(|a| self.within_tolerance(c, *a))
        })
    }

    fn is_exempt(&self, token: &NumberToken) -> bool {
        if token.percent || !token.integral || token.value < 0.0 {
            return false;
        }
        let v = token.value as i64;
        (self.config.min_year..=self.config.max_year).contains(&v) || v <= self.config.small_integer_max
    }
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrector::QueryPlan;
    use crate::database::RawRows;
    use crate::metrics::{MetricInput, MetricKind, MetricValue};

    fn result() -> ExecutionResult {
        ExecutionResult::succeeded(
            QueryPlan::default(),
            RawRows {
                columns: vec!["region".into(), "revenue".into()],
                rows: vec![
                    vec![Value::Text("north".into()), Value::Float(1250000.5)],
                    vec![Value::Text("south".into()), Value::Text("980000".into())],
                ],
            },
            1,
            5,
        )
    }

    fn share_metric() -> MetricResult {
        MetricResult {
            kind: MetricKind::Share,
            value: MetricValue::PerRow(vec![56.06, 43.94]),
            formula: "revenue / 2230000.5 * 100".into(),
            inputs: vec![MetricInput::new("sum(revenue)", 2230000.5)],
            columns: vec!["revenue".into()],
            sql: None,
        }
    }

    #[test]
    fn test_supported_narrative_passes() {
        let v = ResponseValidator::default();
        let report = v.validate_response(
            "In 2024, north earned 1,250,000.50 (56.06%) and south 980,000 across 2 regions, \
             for a total of 2,230,000.50.",
            &result(),
            &[share_metric()],
        );
        assert!(report.passed, "flagged: {:?}", report.flagged);
        assert!(report.allowed_numbers.contains("1250000.5"));
    }

    #[test]
    fn test_fabricated_number_is_flagged_alone() {
        let v = ResponseValidator::default();
        let report = v.validate_response(
            "North earned 1,250,000.50, south 980,000 and west 815,300.",
            &result(),
            &[],
        );
        assert!(!report.passed);
        assert_eq!(report.flagged.len(), 1);
        assert_eq!(report.flagged[0].token, "815,300");
        assert_eq!(report.flagged[0].nearest_allowed, Some(980000.0));
    }

    #[test]
    fn test_tolerance_is_tight() {
        let v = ResponseValidator::default();
        let mut allowed = AllowedNumbers::new();
        allowed.insert(2.85);
        assert!(v.validate("CAGR was 2.85%", &allowed).passed);
        assert!(!v.validate("CAGR was 2.9%", &allowed).passed);
    }

    #[test]
    fn test_years_and_small_counts_are_exempt() {
        let v = ResponseValidator::default();
        let report = v.validate("Between 2019 and 2024 the top 3 stores led.", &AllowedNumbers::new());
        assert!(report.passed);
        assert_eq!(report.checked, 3);

        let report = v.validate("Sales rose 7% to 42 units.", &AllowedNumbers::new());
        let tokens: Vec<&str> = report.flagged.iter().map(|f| f.token.as_str()).collect();
        assert_eq!(tokens, vec!["7%", "42"]);
    }

    #[test]
    fn test_percent_matches_fraction() {
        let v = ResponseValidator::default();
        let mut allowed = AllowedNumbers::new();
        allowed.insert(0.25);
        assert!(v.validate("a 25% return rate", &allowed).passed);
    }

    #[test]
    fn test_unsigned_prose_matches_negative_value() {
        let v = ResponseValidator::default();
        let mut allowed = AllowedNumbers::new();
        allowed.insert(-3.5);
        assert!(v.validate("Revenue decreased by 3.5% this quarter.", &allowed).passed);
        assert!(v.validate("Growth came in at -3.5%.", &allowed).passed);

        // An explicit sign is kept
        let mut allowed = AllowedNumbers::new();
        allowed.insert(2.85);
        let report = v.validate("CAGR was -2.85%", &allowed);
        assert!(!report.passed);
        assert_eq!(report.flagged[0].token, "-2.85%");
    }
}
