//! Runtime configuration
//!
//! Read from the environment (after `.env` is loaded by the binary). Command
//! line flags override individual values.

use crate::error::{GuardianError, Result};
use crate::execution::RetryPolicy;
use crate::pipeline::store::DEFAULT_RESULT_CAPACITY;
use crate::relationships::{default_relationships, RelationshipGraph};
use crate::validation::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianConfig {
    pub database_url: String,
    /// Overrides the name derived from the URL; keys the catalog cache
    pub database_name: Option<String>,
    pub catalog_ttl_hours: u64,
    /// `None` disables the on-disk catalog cache
    pub cache_path: Option<PathBuf>,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub attempt_timeout_secs: u64,
    pub number_tolerance: f64,
    /// JSON file of relationships; the built-in retail list when unset
    pub relationships_path: Option<PathBuf>,
    /// Enables edit-distance table correction
    pub fuzzy_table_names: bool,
    /// Finished outcomes kept for lookup by request id; oldest evicted first
    pub result_capacity: usize,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            database_name: None,
            catalog_ttl_hours: 24,
            cache_path: Some(PathBuf::from(".guardian/catalog_cache.db")),
            max_retries: 3,
            retry_delay_ms: 1000,
            attempt_timeout_secs: 30,
            number_tolerance: 0.001,
            relationships_path: None,
            fuzzy_table_names: false,
            result_capacity: DEFAULT_RESULT_CAPACITY,
        }
    }
}

impl GuardianConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| GuardianError::Config("DATABASE_URL is not set".to_string()))?;

        Ok(Self {
            database_url,
            database_name: lookup("GUARDIAN_DATABASE_NAME").filter(|v| !v.is_empty()),
            catalog_ttl_hours: parse_or(&lookup, "GUARDIAN_CATALOG_TTL_HOURS", defaults.catalog_ttl_hours)?,
            cache_path: match lookup("GUARDIAN_CACHE_PATH") {
                Some(v) if v.is_empty() || v == "none" => None,
                Some(v) => Some(PathBuf::from(v)),
                None => defaults.cache_path,
            },
            max_retries: parse_or(&lookup, "GUARDIAN_MAX_RETRIES", defaults.max_retries)?,
            retry_delay_ms: parse_or(&lookup, "GUARDIAN_RETRY_DELAY_MS", defaults.retry_delay_ms)?,
            attempt_timeout_secs: parse_or(
                &lookup,
                "GUARDIAN_ATTEMPT_TIMEOUT_SECS",
                defaults.attempt_timeout_secs,
            )?,
            number_tolerance: parse_or(&lookup, "GUARDIAN_NUMBER_TOLERANCE", defaults.number_tolerance)?,
            relationships_path: relationships_path(&lookup),
            fuzzy_table_names: parse_or(&lookup, "GUARDIAN_FUZZY_TABLE_NAMES", defaults.fuzzy_table_names)?,
            result_capacity: parse_or(&lookup, "GUARDIAN_RESULT_CAPACITY", defaults.result_capacity)?,
        })
    }

    /// Relationship graph from `GUARDIAN_RELATIONSHIPS` alone. Needs no
    /// database, so it works without `DATABASE_URL`.
    pub fn relationship_graph_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<RelationshipGraph> {
        load_relationships(relationships_path(&lookup).as_deref())
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_hours * 60 * 60)
    }

    /// `max_retries` is the total attempt budget
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            tolerance: self.number_tolerance,
            ..ValidatorConfig::default()
        }
    }

    pub fn relationship_graph(&self) -> Result<RelationshipGraph> {
        load_relationships(self.relationships_path.as_deref())
    }
}

fn relationships_path(lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    lookup("GUARDIAN_RELATIONSHIPS")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn load_relationships(path: Option<&Path>) -> Result<RelationshipGraph> {
    match path {
        Some(path) => RelationshipGraph::from_json_file(path),
        None => Ok(RelationshipGraph::new(default_relationships())),
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| GuardianError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        _ => Ok(default),
    }
}
