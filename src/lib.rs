//! Guarded execution of generated SQL against a live relational database.
//!
//! Untrusted SQL is corrected and checked against a cached schema catalog,
//! executed with bounded retries, optionally post-processed by deterministic
//! metric formulas, and any narrative written about the result is checked
//! for numbers that did not come from the data.

pub mod catalog;
pub mod config;
pub mod corrector;
pub mod database;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod pipeline;
pub mod relationships;
pub mod validation;

pub use catalog::{CatalogSnapshot, SchemaCatalog};
pub use config::GuardianConfig;
pub use corrector::{QueryCorrector, QueryPlan};
pub use error::{ErrorKind, GuardianError, Result};
pub use execution::{ExecutionResult, Executor, RetryPolicy};
pub use metrics::{MetricEngine, MetricKind, MetricResult};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRequest, RequestState};
pub use relationships::RelationshipGraph;
pub use validation::{ResponseValidator, ValidationReport};
