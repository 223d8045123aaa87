//! Execution
//!
//! Retrying executor, its policy, failure classification and result type.

pub mod error_classifier;
pub mod executor;
pub mod result;
pub mod retry;

pub use error_classifier::{ClassifiedError, ErrorClassifier};
pub use executor::Executor;
pub use result::{ExecutionFailure, ExecutionResult, ExecutionStatus};
pub use retry::RetryPolicy;
