//! Query Corrector
//!
//! Rewrites known-bad table names, extracts referenced tables and columns, and
//! rejects any query the catalog cannot confirm. Column names are never
//! rewritten. Unqualified column references are not validated.

pub mod guard;
pub mod references;
pub mod strategy;

pub use references::{extract_references, ColumnRef, References, TableMention};
pub use strategy::{CorrectionStrategy, EditDistanceCorrection, FixedAliasCorrection};

use crate::catalog::{CatalogSnapshot, SchemaCatalog};
use crate::database::Dialect;
use crate::error::{GuardianError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A table-name substitution applied to the raw SQL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub from: String,
    pub to: String,
    pub strategy: String,
}

/// Per-request record of what the corrector saw and decided.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryPlan {
    pub raw_sql: String,
    pub corrected_sql: String,
    pub referenced_tables: Vec<String>,
    pub referenced_columns: Vec<ColumnRef>,
    pub substitutions: Vec<Substitution>,
    pub validation_errors: Vec<String>,
    pub validated: bool,
}

/// A query the catalog did not confirm. Carries the plan for reporting.
#[derive(Debug)]
pub struct Rejection {
    pub plan: QueryPlan,
    pub error: GuardianError,
}

pub struct QueryCorrector {
    catalog: Arc<SchemaCatalog>,
    strategies: Vec<Box<dyn CorrectionStrategy>>,
    dialect: Dialect,
}

impl QueryCorrector {
    /// Corrector with the fixed alias table only
    pub fn new(catalog: Arc<SchemaCatalog>, dialect: Dialect) -> Self {
        Self {
            catalog,
            strategies: vec![Box::new(FixedAliasCorrection::default())],
            dialect,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn CorrectionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn CorrectionStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Rename tables where they are named as tables: FROM/JOIN position and
    /// qualifiers spelled with the table name. Columns, aliases and literals
    /// are left as written.
    pub fn correct(&self, sql: &str, catalog: Option<&CatalogSnapshot>) -> (String, Vec<Substitution>) {
        let refs = extract_references(sql);
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        let mut substitutions = Vec::new();

        for table in &refs.tables {
            let Some((to, strategy)) = self
                .strategies
                .iter()
                .find_map(|s| s.correct_table(table, catalog).map(|to| (to, s.name())))
            else {
                continue;
            };
            if to.eq_ignore_ascii_case(table) {
                continue;
            }

            edits.extend(
                refs.mentions
                    .iter()
                    .filter(|m| m.name.eq_ignore_ascii_case(table))
                    .map(|m| (m.span.clone(), to.clone())),
            );
            info!("Corrected table '{}' -> '{}' ({})", table, to, strategy);
            substitutions.push(Substitution {
                from: table.clone(),
                to,
                strategy: strategy.to_string(),
            });
        }

        // back to front so earlier spans stay valid
        edits.sort_by_key(|(span, _)| span.start);
        let mut corrected = sql.to_string();
        for (span, to) in edits.into_iter().rev() {
            corrected.replace_range(span, &to);
        }

        (corrected, substitutions)
    }

    /// Build the plan for a request: substitutions, then references of the
    /// corrected text.
    pub fn plan(&self, sql: &str, catalog: Option<&CatalogSnapshot>) -> QueryPlan {
        let (corrected_sql, substitutions) = self.correct(sql, catalog);
        let refs = extract_references(&corrected_sql);
        QueryPlan {
            raw_sql: sql.to_string(),
            corrected_sql,
            referenced_tables: refs.tables,
            referenced_columns: refs.columns,
            substitutions,
            validation_errors: Vec::new(),
            validated: false,
        }
    }

    /// Check a plan against one catalog snapshot.
    ///
    /// Stops at the first unknown table; otherwise collects every unknown
    /// qualified column.
    pub fn validate(&self, plan: &mut QueryPlan, catalog: &CatalogSnapshot) -> Result<()> {
        let outcome = self.check(plan, catalog);
        match &outcome {
            Ok(()) => plan.validated = true,
            Err(e) => {
                plan.validated = false;
                plan.validation_errors.push(e.to_string());
            }
        }
        outcome
    }

    fn check(&self, plan: &QueryPlan, catalog: &CatalogSnapshot) -> Result<()> {
        guard::ensure_read_only(&plan.corrected_sql, self.dialect)?;

        for table in &plan.referenced_tables {
            if !catalog.has_table(table) {
                return Err(GuardianError::TableNotFound {
                    table: table.clone(),
                    suggestion: strategy::closest_table(catalog, table),
                });
            }
        }

        let mut missing: Vec<String> = Vec::new();
        for col in &plan.referenced_columns {
            let known = match catalog.has_column(&col.table, &col.column) {
                Ok(found) => found,
                Err(GuardianError::UnknownTable(_)) => false,
                Err(e) => return Err(e),
            };
            if !known {
                let name = col.qualified_name();
                if !missing.contains(&name) {
                    missing.push(name);
                }
            }
        }

        if missing.is_empty() {
            debug!(
                "Validated {} tables, {} qualified columns",
                plan.referenced_tables.len(),
                plan.referenced_columns.len()
            );
            Ok(())
        } else {
            Err(GuardianError::ColumnNotFound { columns: missing })
        }
    }

    /// Full pre-execution check against a fresh catalog snapshot. No statement
    /// is sent to the database here beyond a catalog refresh.
    pub async fn prepare(&self, sql: &str) -> std::result::Result<QueryPlan, Rejection> {
        let snapshot = match self.catalog.ensure_fresh().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                let mut plan = self.plan(sql, None);
                plan.validation_errors.push(error.to_string());
                return Err(Rejection { plan, error });
            }
        };

        let mut plan = self.plan(sql, Some(&snapshot));
        match self.validate(&mut plan, &snapshot) {
            Ok(()) => Ok(plan),
            Err(error) => {
                warn!("Rejected query before execution: {}", error);
                Err(Rejection { plan, error })
            }
        }
    }
}
