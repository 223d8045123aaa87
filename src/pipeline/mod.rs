//! Request pipeline
//!
//! Drives one request through correction, execution, the optional metric and
//! narrative validation, recording every state it passes through.
//!
//! ```text
//! RECEIVED -> CORRECTING -> REJECTED_SCHEMA
//!                        -> VALIDATED -> EXECUTING -> FAILED_PERMANENT
//!                                                  -> RETRYING -> EXECUTING
//!                                                  -> SUCCEEDED_EMPTY | SUCCEEDED_WITH_ROWS
//!                                                     -> [METRIC_COMPUTED] -> NARRATIVE_VALIDATED -> DONE
//! ```

pub mod collaborators;
pub mod context;
pub mod store;

pub use collaborators::{FixedNarrative, FixedSql, NarrativeGenerator, SqlGenerator, SummaryNarrative};
pub use context::SchemaContext;
pub use store::ResultStore;

use crate::catalog::{CatalogCache, SchemaCatalog};
use crate::config::GuardianConfig;
use crate::corrector::{EditDistanceCorrection, QueryCorrector};
use crate::database;
use crate::error::{GuardianError, Result};
use crate::execution::{ExecutionResult, ExecutionStatus, Executor};
use crate::metrics::{MetricEngine, MetricRequest, MetricResult};
use crate::relationships::RelationshipGraph;
use crate::validation::{ResponseValidator, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Received,
    Correcting,
    RejectedSchema,
    Validated,
    Executing,
    Retrying,
    FailedPermanent,
    SucceededEmpty,
    SucceededWithRows,
    MetricComputed,
    NarrativeValidated,
    Done,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::RejectedSchema | RequestState::FailedPermanent | RequestState::Done
        )
    }
}

/// One request's inputs. The SQL and narrative are untrusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub question: Option<String>,
    pub sql: String,
    pub narrative: Option<String>,
    /// Overrides metric detection from the question
    pub metric: Option<MetricRequest>,
}

impl PipelineRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_narrative(mut self, narrative: impl Into<String>) -> Self {
        self.narrative = Some(narrative.into());
        self
    }

    pub fn with_metric(mut self, metric: MetricRequest) -> Self {
        self.metric = Some(metric);
        self
    }
}

/// Everything the presentation layer needs for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub question: Option<String>,
    pub sql: String,
    pub corrected_sql: String,
    pub execution: ExecutionResult,
    pub metric: Option<MetricResult>,
    /// Why no metric was computed, when one was requested
    pub metric_error: Option<String>,
    pub narrative: Option<String>,
    pub validation: Option<ValidationReport>,
    pub retry_count: u32,
    pub state: RequestState,
    pub history: Vec<RequestState>,
    pub created_at: DateTime<Utc>,
}

struct StateTrace {
    request_id: Uuid,
    history: Vec<RequestState>,
}

impl StateTrace {
    fn new(request_id: Uuid) -> Self {
        let mut trace = Self {
            request_id,
            history: Vec::new(),
        };
        trace.advance(RequestState::Received);
        trace
    }

    fn advance(&mut self, state: RequestState) {
        info!("request {} -> {:?}", self.request_id, state);
        self.history.push(state);
    }

    fn current(&self) -> RequestState {
        self.history.last().copied().unwrap_or(RequestState::Received)
    }
}

pub struct Pipeline {
    executor: Arc<Executor>,
    metrics: MetricEngine,
    validator: ResponseValidator,
    graph: Arc<RelationshipGraph>,
    store: Arc<ResultStore>,
}

impl Pipeline {
    pub fn new(executor: Arc<Executor>, graph: Arc<RelationshipGraph>, validator: ResponseValidator) -> Self {
        Self {
            metrics: MetricEngine::new(Arc::clone(&executor)),
            executor,
            validator,
            graph,
            store: Arc::new(ResultStore::new()),
        }
    }

    /// Wire the full stack from configuration and load the catalog.
    pub async fn connect(config: &GuardianConfig) -> Result<Self> {
        let db = database::connect(&config.database_url, config.database_name.as_deref()).await?;
        info!("Connected to '{}' ({:?})", db.name(), db.dialect());

        let mut catalog = SchemaCatalog::new(Arc::clone(&db)).with_ttl(config.catalog_ttl());
        if let Some(path) = &config.cache_path {
            match CatalogCache::open(path) {
                Ok(cache) => catalog = catalog.with_cache(cache),
                Err(e) => warn!("Catalog cache disabled: {}", e),
            }
        }
        let catalog = Arc::new(catalog);
        catalog.load_or_refresh().await?;

        let mut corrector = QueryCorrector::new(catalog, db.dialect());
        if config.fuzzy_table_names {
            corrector = corrector.with_strategy(Box::new(EditDistanceCorrection::default()));
        }
        let executor = Executor::new(db, Arc::new(corrector)).with_policy(config.retry_policy());

        Ok(Self::new(
            Arc::new(executor),
            Arc::new(config.relationship_graph()?),
            ResponseValidator::new(config.validator_config()),
        )
        .with_store(Arc::new(ResultStore::with_capacity(config.result_capacity))))
    }

    pub fn with_store(mut self, store: Arc<ResultStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn metrics(&self) -> &MetricEngine {
        &self.metrics
    }

    pub fn graph(&self) -> &Arc<RelationshipGraph> {
        &self.graph
    }

    /// Catalog tables and join hints for the SQL generator
    pub async fn schema_context(&self) -> Result<SchemaContext> {
        let snapshot = self.executor.corrector().catalog().ensure_fresh().await?;
        Ok(SchemaContext::build(&snapshot, &self.graph))
    }

    /// Generate SQL for a question, then run it.
    pub async fn answer(
        &self,
        question: &str,
        generator: &dyn SqlGenerator,
        narrator: &dyn NarrativeGenerator,
    ) -> Result<Arc<PipelineOutcome>> {
        let context = self.schema_context().await?;
        let sql = generator.generate_sql(question, &context).await?;
        let request = PipelineRequest::new(sql).with_question(question);
        Ok(self.run(request, Some(narrator)).await)
    }

    /// Run one request to a terminal state. A narrative in the request wins
    /// over the narrator.
    pub async fn run(
        &self,
        request: PipelineRequest,
        narrator: Option<&dyn NarrativeGenerator>,
    ) -> Arc<PipelineOutcome> {
        let request_id = Uuid::new_v4();
        let mut trace = StateTrace::new(request_id);
        trace.advance(RequestState::Correcting);

        let execution = self.executor.execute(&request.sql).await;
        record_execution(&mut trace, &execution);

        let mut metric = None;
        let mut metric_error = None;
        let mut narrative = None;
        let mut validation = None;

        if !trace.current().is_terminal() {
            if execution.status == ExecutionStatus::Rows {
                match self.compute_metric(&request, &execution).await {
                    Some(Ok(m)) => {
                        trace.advance(RequestState::MetricComputed);
                        metric = Some(m);
                    }
                    Some(Err(e)) => {
                        warn!("No metric computed: {}", e);
                        metric_error = Some(e.to_string());
                    }
                    None => {}
                }
            }

            narrative = match (&request.narrative, narrator) {
                (Some(text), _) => Some(text.clone()),
                (None, Some(narrator)) => {
                    let question = request.question.as_deref().unwrap_or_default();
                    match narrator.generate_narrative(question, &execution, metric.as_ref()).await {
                        Ok(text) => Some(text),
                        Err(e) => {
                            warn!("Narrative generation failed: {}", e);
                            None
                        }
                    }
                }
                (None, None) => None,
            };

            if let Some(text) = &narrative {
                let metrics: Vec<MetricResult> = metric.iter().cloned().collect();
                let report = self.validator.validate_response(text, &execution, &metrics);
                trace.advance(RequestState::NarrativeValidated);
                validation = Some(report);
            }
            trace.advance(RequestState::Done);
        }

        let outcome = PipelineOutcome {
            request_id,
            question: request.question,
            sql: request.sql,
            corrected_sql: execution.plan.corrected_sql.clone(),
            retry_count: execution.retry_count,
            execution,
            metric,
            metric_error,
            narrative,
            validation,
            state: trace.current(),
            history: trace.history,
            created_at: Utc::now(),
        };
        self.store.insert(outcome)
    }

    async fn compute_metric(
        &self,
        request: &PipelineRequest,
        execution: &ExecutionResult,
    ) -> Option<Result<MetricResult>> {
        let question = request.question.as_deref().unwrap_or_default();
        let metric_request = request
            .metric
            .clone()
            .or_else(|| self.metrics.request_for(question))?;
        Some(self.metrics.compute(&metric_request, question, execution).await)
    }

    /// Stored outcome for a request id
    pub fn outcome(&self, request_id: &Uuid) -> Result<Arc<PipelineOutcome>> {
        self.store
            .get(request_id)
            .ok_or_else(|| GuardianError::Execution(format!("No result for request {}", request_id)))
    }
}

/// Replay the executor's path through the state machine
fn record_execution(trace: &mut StateTrace, execution: &ExecutionResult) {
    if execution.status == ExecutionStatus::Rejected {
        trace.advance(RequestState::RejectedSchema);
        return;
    }
    trace.advance(RequestState::Validated);
    trace.advance(RequestState::Executing);
    for _ in 0..execution.retry_count {
        trace.advance(RequestState::Retrying);
        trace.advance(RequestState::Executing);
    }
    trace.advance(match execution.status {
        ExecutionStatus::Rows => RequestState::SucceededWithRows,
        ExecutionStatus::EmptyResult => RequestState::SucceededEmpty,
        _ => RequestState::FailedPermanent,
    });
}
