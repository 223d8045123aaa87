//! Fixed-formula metrics over an already-fetched result

use super::{MetricInput, MetricKind, MetricResult, MetricValue};
use crate::error::{GuardianError, Result};
use crate::execution::ExecutionResult;
use crate::validation::numbers::format_number;

const PERIOD_MARKERS: &[&str] = &[
    "year", "month", "quarter", "date", "period", "week", "day", "code",
];

/// Period and identifier columns are never measures.
pub fn is_period_or_identifier(column: &str) -> bool {
    let lowered = column.to_lowercase();
    lowered == "id"
        || lowered.ends_with("_id")
        || lowered.starts_with("id_")
        || PERIOD_MARKERS.iter().any(|m| lowered.contains(m))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn no_metric(message: impl Into<String>) -> GuardianError {
    GuardianError::MetricComputation(message.into())
}

/// Columns with at least one value where every non-null value is numeric
fn numeric_columns(result: &ExecutionResult) -> Vec<usize> {
    (0..result.column_names.len())
        .filter(|&idx| {
            let mut seen = false;
            for row in &result.rows {
                match row.get(idx) {
                    Some(v) if v.is_null() => {}
                    Some(v) if v.as_f64().is_some() => seen = true,
                    _ => return false,
                }
            }
            seen
        })
        .collect()
}

/// Measure columns: requested targets when present, else numeric non-period columns
fn measure_columns(result: &ExecutionResult, targets: &[String]) -> Result<Vec<usize>> {
    let numeric = numeric_columns(result);
    if !targets.is_empty() {
        return targets
            .iter()
            .map(|t| {
                result
                    .column_index(t)
                    .filter(|idx| numeric.contains(idx))
                    .ok_or_else(|| no_metric(format!("numeric column '{}' not in result", t)))
            })
            .collect();
    }
    Ok(numeric
        .into_iter()
        .filter(|&idx| !is_period_or_identifier(&result.column_names[idx]))
        .collect())
}

fn cell(result: &ExecutionResult, row: usize, col: usize) -> Result<f64> {
    result
        .rows
        .get(row)
        .and_then(|r| r.get(col))
        .and_then(|v| v.as_f64())
        .ok_or_else(|| {
            no_metric(format!(
                "missing value in column '{}' at row {}",
                result.column_names[col],
                row + 1
            ))
        })
}

/// growth% = (last - first) / first * 100 over the first measure column
pub fn growth(result: &ExecutionResult, targets: &[String]) -> Result<MetricResult> {
    let col = *measure_columns(result, targets)?
        .first()
        .ok_or_else(|| no_metric("no numeric measure column for growth"))?;
    if result.rows.len() < 2 {
        return Err(no_metric("growth needs at least two rows"));
    }
    let name = &result.column_names[col];
    let first = cell(result, 0, col)?;
    let last = cell(result, result.rows.len() - 1, col)?;
    if first == 0.0 {
        return Err(no_metric("growth base value is zero"));
    }

    let value = round2((last - first) / first * 100.0);
    Ok(MetricResult {
        kind: MetricKind::Growth,
        value: MetricValue::Scalar(value),
        formula: format!(
            "({} - {}) / {} * 100 = {}",
            format_number(last),
            format_number(first),
            format_number(first),
            format_number(value)
        ),
        inputs: vec![
            MetricInput::new(format!("first {}", name), first),
            MetricInput::new(format!("last {}", name), last),
        ],
        columns: vec![name.clone()],
        sql: None,
    })
}

/// ratio = column_i / column_j per row, for the first two measure columns
pub fn ratio(result: &ExecutionResult, targets: &[String]) -> Result<MetricResult> {
    let cols = measure_columns(result, targets)?;
    let (num, den) = match cols.as_slice() {
        [n, d, ..] => (*n, *d),
        _ => return Err(no_metric("ratio needs two numeric columns")),
    };
    if result.rows.is_empty() {
        return Err(no_metric("ratio needs at least one row"));
    }
    let num_name = &result.column_names[num];
    let den_name = &result.column_names[den];

    let mut values = Vec::with_capacity(result.rows.len());
    let mut inputs = Vec::new();
    for row in 0..result.rows.len() {
        let n = cell(result, row, num)?;
        let d = cell(result, row, den)?;
        if d == 0.0 {
            return Err(no_metric(format!("division by zero in '{}' at row {}", den_name, row + 1)));
        }
        values.push(round2(n / d));
        inputs.push(MetricInput::new(format!("{}[{}]", num_name, row + 1), n));
        inputs.push(MetricInput::new(format!("{}[{}]", den_name, row + 1), d));
    }

    Ok(MetricResult {
        kind: MetricKind::Ratio,
        value: MetricValue::PerRow(values),
        formula: format!("{} / {}", num_name, den_name),
        inputs,
        columns: vec![num_name.clone(), den_name.clone()],
        sql: None,
    })
}

/// share% = row value / column sum * 100, per row
pub fn share(result: &ExecutionResult, targets: &[String]) -> Result<MetricResult> {
    let col = *measure_columns(result, targets)?
        .first()
        .ok_or_else(|| no_metric("no numeric measure column for share"))?;
    let name = &result.column_names[col];
    let values = (0..result.rows.len())
        .map(|row| cell(result, row, col))
        .collect::<Result<Vec<f64>>>()?;
    let total: f64 = values.iter().sum();
    if values.is_empty() || total == 0.0 {
        return Err(no_metric(format!("sum of '{}' is zero", name)));
    }

    let mut inputs: Vec<MetricInput> = values
        .iter()
        .enumerate()
        .map(|(i, v)| MetricInput::new(format!("{}[{}]", name, i + 1), *v))
        .collect();
    inputs.push(MetricInput::new(format!("sum({})", name), total));

    Ok(MetricResult {
        kind: MetricKind::Share,
        value: MetricValue::PerRow(values.iter().map(|v| round2(v / total * 100.0)).collect()),
        formula: format!("{} / {} * 100", name, format_number(total)),
        inputs,
        columns: vec![name.clone()],
        sql: None,
    })
}

/// aov = sum(amount column) / sum(order count column)
pub fn aov(result: &ExecutionResult, targets: &[String]) -> Result<MetricResult> {
    let numeric = numeric_columns(result);
    let find = |needle: &str, skip: Option<usize>| {
        numeric
            .iter()
            .copied()
            .filter(|idx| Some(*idx) != skip)
            .find(|&idx| result.column_names[idx].to_lowercase().contains(needle))
    };

    let (amount_col, order_col) = match targets {
        [a, o, ..] => (
            result.column_index(a).filter(|i| numeric.contains(i)),
            result.column_index(o).filter(|i| numeric.contains(i)),
        ),
        _ => {
            let amount = find("amount", None);
            (amount, find("order", amount))
        }
    };
    let amount_col = amount_col.ok_or_else(|| no_metric("no amount column for average order value"))?;
    let order_col = order_col.ok_or_else(|| no_metric("no order count column for average order value"))?;
    if result.rows.is_empty() {
        return Err(no_metric("average order value needs at least one row"));
    }

    let mut amount = 0.0;
    let mut orders = 0.0;
    for row in 0..result.rows.len() {
        amount += cell(result, row, amount_col)?;
        orders += cell(result, row, order_col)?;
    }
    if orders == 0.0 {
        return Err(no_metric("order count is zero"));
    }

    let value = round2(amount / orders);
    let amount_name = &result.column_names[amount_col];
    let order_name = &result.column_names[order_col];
    Ok(MetricResult {
        kind: MetricKind::Aov,
        value: MetricValue::Scalar(value),
        formula: format!(
            "{} / {} = {}",
            format_number(amount),
            format_number(orders),
            format_number(value)
        ),
        inputs: vec![
            MetricInput::new(amount_name.clone(), amount),
            MetricInput::new(order_name.clone(), orders),
        ],
        columns: vec![amount_name.clone(), order_name.clone()],
        sql: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corrector::QueryPlan;
    use crate::database::{RawRows, Value};

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> ExecutionResult {
        let raw = RawRows {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        };
        ExecutionResult::succeeded(QueryPlan::default(), raw, 1, 0)
    }

    #[test]
    fn test_growth_skips_period_columns() {
        let r = result(
            &["year", "revenue"],
            vec![
                vec![Value::Int(2023), Value::Float(1000.0)],
                vec![Value::Int(2024), Value::Float(1100.0)],
            ],
        );
        let m = growth(&r, &[]).unwrap();
        assert_eq!(m.value, MetricValue::Scalar(10.0));
        assert_eq!(m.columns, vec!["revenue"]);
        assert_eq!(m.inputs[0].value, 1000.0);
        assert_eq!(m.formula, "(1100 - 1000) / 1000 * 100 = 10");
    }

    #[test]
    fn test_growth_from_zero_is_no_metric() {
        let r = result(
            &["revenue"],
            vec![vec![Value::Int(0)], vec![Value::Int(50)]],
        );
        assert!(matches!(growth(&r, &[]), Err(GuardianError::MetricComputation(_))));
    }

    #[test]
    fn test_share_sums_to_hundred() {
        let r = result(
            &["region", "total"],
            vec![
                vec![Value::Text("north".into()), Value::Int(100)],
                vec![Value::Text("south".into()), Value::Int(200)],
                vec![Value::Text("west".into()), Value::Int(300)],
            ],
        );
        let m = share(&r, &[]).unwrap();
        let MetricValue::PerRow(values) = &m.value else {
            panic!("expected per-row values");
        };
        assert_eq!(values, &vec![16.67, 33.33, 50.0]);
        assert!((values.iter().sum::<f64>() - 100.0).abs() <= 0.01);
        assert_eq!(m.inputs.last().map(|i| i.value), Some(600.0));
    }

    #[test]
    fn test_ratio_needs_two_numeric_columns() {
        let r = result(&["region", "total"], vec![vec![Value::Text("n".into()), Value::Int(1)]]);
        assert!(matches!(ratio(&r, &[]), Err(GuardianError::MetricComputation(_))));

        let r = result(
            &["returns", "orders"],
            vec![vec![Value::Int(5), Value::Int(20)], vec![Value::Int(3), Value::Int(4)]],
        );
        assert_eq!(ratio(&r, &[]).unwrap().value, MetricValue::PerRow(vec![0.25, 0.75]));
    }

    #[test]
    fn test_ratio_division_by_zero() {
        let r = result(&["a", "b"], vec![vec![Value::Int(5), Value::Int(0)]]);
        assert!(matches!(ratio(&r, &[]), Err(GuardianError::MetricComputation(_))));
    }

    #[test]
    fn test_aov_by_column_names() {
        let r = result(
            &["total_amount", "order_count"],
            vec![vec![Value::Float(1000.0), Value::Int(10)]],
        );
        let m = aov(&r, &[]).unwrap();
        assert_eq!(m.value, MetricValue::Scalar(100.0));
        assert_eq!(m.columns, vec!["total_amount", "order_count"]);
    }

    #[test]
    fn test_aov_missing_order_column() {
        let r = result(&["total_amount"], vec![vec![Value::Float(1000.0)]]);
        assert!(matches!(aov(&r, &[]), Err(GuardianError::MetricComputation(_))));
    }

    #[test]
    fn test_explicit_target_column() {
        let r = result(
            &["units", "revenue"],
            vec![vec![Value::Int(10), Value::Int(200)], vec![Value::Int(20), Value::Int(300)]],
        );
        let m = growth(&r, &["revenue".to_string()]).unwrap();
        assert_eq!(m.value, MetricValue::Scalar(50.0));
        assert!(growth(&r, &["margin".to_string()]).is_err());
    }

    #[test]
    fn test_identifier_detection() {
        assert!(is_period_or_identifier("customer_id"));
        assert!(is_period_or_identifier("Fiscal_Year"));
        assert!(is_period_or_identifier("sale_date"));
        assert!(!is_period_or_identifier("revenue"));
        assert!(!is_period_or_identifier("paid"));
    }
}
