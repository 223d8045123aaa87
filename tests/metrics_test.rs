mod common;

use common::{executor_for, fast_policy, retail_sqlite};
use sql_guardian::metrics::{CagrRequest, MetricEngine, MetricRequest, MetricValue};
use sql_guardian::pipeline::{Pipeline, PipelineRequest, RequestState};
use sql_guardian::relationships::{default_relationships, RelationshipGraph};
use sql_guardian::{MetricKind, ResponseValidator};
use std::sync::Arc;

fn pipeline() -> Pipeline {
    let executor = Arc::new(executor_for(retail_sqlite(), fast_policy(3)));
    Pipeline::new(
        executor,
        Arc::new(RelationshipGraph::new(default_relationships())),
        ResponseValidator::default(),
    )
}

#[tokio::test]
async fn test_cagr_runs_in_database_and_is_deterministic() {
    let engine = MetricEngine::new(Arc::new(executor_for(retail_sqlite(), fast_policy(3))));
    let request = CagrRequest::new("sales", "amount", "sale_date", 2023, 2024).unwrap();

    let first = engine.cagr(&request).await.unwrap();
    let second = engine.cagr(&request).await.unwrap();

    let value = first.value.as_scalar().unwrap();
    assert!((value - 2.85).abs() < 1e-9, "cagr was {}", value);
    assert_eq!(first.value, second.value);
    assert_eq!(first.kind, MetricKind::Cagr);
    assert!(first.sql.as_deref().unwrap().contains("NULLIF(start_value, 0)"));
    let start = first.inputs.iter().find(|i| i.name == "start_value").unwrap();
    assert!((start.value - 3996499.31).abs() < 1e-6);
}

#[tokio::test]
async fn test_cagr_with_missing_start_year_fails() {
    let engine = MetricEngine::new(Arc::new(executor_for(retail_sqlite(), fast_policy(3))));
    let request = CagrRequest::new("sales", "amount", "sale_date", 2019, 2024).unwrap();
    assert!(engine.cagr(&request).await.is_err());
}

#[tokio::test]
async fn test_cagr_inferred_from_question() {
    let p = pipeline();
    let request = PipelineRequest::new("SELECT sale_id, amount, sale_date FROM sales ORDER BY sale_id")
        .with_question("What was the CAGR of sales between 2023 and 2024?");
    let outcome = p.run(request, None).await;

    let metric = outcome.metric.as_ref().expect("cagr computed");
    assert_eq!(metric.kind, MetricKind::Cagr);
    assert!((metric.value.as_scalar().unwrap() - 2.85).abs() < 1e-9);
    assert_eq!(outcome.state, RequestState::Done);
}

#[tokio::test]
async fn test_growth_over_ordered_rows() {
    let p = pipeline();
    let request = PipelineRequest::new("SELECT month, revenue FROM monthly_revenue ORDER BY month")
        .with_question("How much did revenue increase this quarter?");
    let outcome = p.run(request, None).await;

    let metric = outcome.metric.as_ref().expect("growth computed");
    assert_eq!(metric.kind, MetricKind::Growth);
    assert_eq!(metric.value, MetricValue::Scalar(10.0));
    assert_eq!(metric.columns, vec!["revenue"]);
}

#[tokio::test]
async fn test_share_per_row() {
    let p = pipeline();
    let request = PipelineRequest::new("SELECT region, sales FROM regional_sales ORDER BY region")
        .with_question("What share of sales does each region contribute?");
    let outcome = p.run(request, None).await;

    let metric = outcome.metric.as_ref().expect("share computed");
    assert_eq!(metric.kind, MetricKind::Share);
    assert_eq!(metric.value, MetricValue::PerRow(vec![16.67, 33.33, 50.0]));
}

#[tokio::test]
async fn test_average_order_value() {
    let p = pipeline();
    let request = PipelineRequest::new("SELECT store, total_amount, order_count FROM store_orders")
        .with_question("What is the average order value per store?");
    let outcome = p.run(request, None).await;

    let metric = outcome.metric.as_ref().expect("aov computed");
    assert_eq!(metric.kind, MetricKind::Aov);
    assert_eq!(metric.value, MetricValue::Scalar(100.0));
}

#[tokio::test]
async fn test_explicit_metric_overrides_detection() {
    let p = pipeline();
    let request = PipelineRequest::new("SELECT region, sales FROM regional_sales ORDER BY region")
        .with_question("How did sales grow?")
        .with_metric(MetricRequest::new(MetricKind::Share).with_columns(vec!["sales".to_string()]));
    let outcome = p.run(request, None).await;

    assert_eq!(outcome.metric.as_ref().map(|m| m.kind), Some(MetricKind::Share));
}
