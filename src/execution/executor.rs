//! Executor with Retry
//!
//! Validates first, then runs the corrected SQL. A schema rejection returns
//! before any statement reaches the database. Only transient connectivity
//! failures are retried.

use super::error_classifier::ErrorClassifier;
use super::result::{ExecutionFailure, ExecutionResult};
use super::retry::RetryPolicy;
use crate::corrector::{QueryCorrector, QueryPlan};
use crate::database::Database;
use crate::error::{ErrorKind, UserFacing};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct Executor {
    database: Arc<dyn Database>,
    corrector: Arc<QueryCorrector>,
    policy: RetryPolicy,
    classifier: ErrorClassifier,
}

impl Executor {
    pub fn new(database: Arc<dyn Database>, corrector: Arc<QueryCorrector>) -> Self {
        Self {
            database,
            corrector,
            policy: RetryPolicy::default(),
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn corrector(&self) -> &Arc<QueryCorrector> {
        &self.corrector
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub async fn execute(&self, sql: &str) -> ExecutionResult {
        self.execute_with_policy(sql, &self.policy).await
    }

    pub async fn execute_with_policy(&self, sql: &str, policy: &RetryPolicy) -> ExecutionResult {
        let start = Instant::now();

        let plan = match self.corrector.prepare(sql).await {
            Ok(plan) => plan,
            Err(rejection) => {
                info!("Schema rejection, no database round-trip: {}", rejection.error);
                return ExecutionResult::rejected(
                    rejection.plan,
                    &rejection.error,
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        self.run_attempts(plan, policy, start).await
    }

    async fn run_attempts(&self, plan: QueryPlan, policy: &RetryPolicy, start: Instant) -> ExecutionResult {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!("Executing attempt {}/{}: {}", attempt, policy.max_attempts, plan.corrected_sql);

            let outcome = tokio::time::timeout(
                policy.attempt_timeout,
                self.database.query(&plan.corrected_sql),
            )
            .await;
            let elapsed_ms = || start.elapsed().as_millis() as u64;

            let db_error = match outcome {
                Ok(Ok(raw)) => {
                    info!(
                        "Query succeeded with {} rows after {} attempt(s)",
                        raw.rows.len(),
                        attempt
                    );
                    return ExecutionResult::succeeded(plan, raw, attempt, elapsed_ms());
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    warn!("Attempt {} exceeded {:?}", attempt, policy.attempt_timeout);
                    let failure = ExecutionFailure::new(
                        ErrorKind::ExecutionTimeout,
                        format!("Query exceeded the {:?} attempt timeout", policy.attempt_timeout),
                        UserFacing::new(
                            "The query took too long to run.",
                            "Narrow the question, for example to a shorter time range.",
                        ),
                        attempt,
                    );
                    return ExecutionResult::failed(plan, failure, elapsed_ms());
                }
            };

            let classified = self.classifier.classify(&db_error);
            if !classified.kind.is_retryable() {
                warn!("Query failed permanently ({}): {}", classified.kind, db_error);
                let failure = ExecutionFailure::new(
                    classified.kind,
                    classified.technical_message,
                    classified.user_facing,
                    attempt,
                );
                return ExecutionResult::failed(plan, failure, elapsed_ms());
            }

            if policy.allows_retry_after(attempt) {
                warn!(
                    "Transient failure on attempt {}/{}, retrying in {:?}: {}",
                    attempt, policy.max_attempts, policy.delay, db_error
                );
                tokio::time::sleep(policy.delay).await;
                continue;
            }

            warn!("Retry budget exhausted after {} attempts: {}", attempt, db_error);
            let failure = ExecutionFailure::new(
                ErrorKind::ExecutionError,
                format!("Failed after {} attempts: {}", attempt, db_error),
                UserFacing::new(
                    format!("The database could not be reached after {} attempts.", attempt),
                    "Try again in a moment.",
                ),
                attempt,
            );
            return ExecutionResult::failed(plan, failure, elapsed_ms());
        }
    }
}
