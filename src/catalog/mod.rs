//! Schema Catalog
//!
//! Read-mostly table/column metadata. Readers take an `Arc` to the current
//! snapshot and keep using it for the whole validation; a refresh builds a
//! complete new snapshot before swapping it in, so no reader ever observes a
//! partially-updated catalog.

pub mod cache;
pub mod snapshot;

pub use cache::CatalogCache;
pub use snapshot::{CatalogSnapshot, ColumnSchema, TableSchema};

use crate::database::Database;
use crate::error::{GuardianError, Result};
use chrono::Utc;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};

pub struct SchemaCatalog {
    database: Arc<dyn Database>,
    current: RwLock<Option<Arc<CatalogSnapshot>>>,
    ttl: Duration,
    cache: Option<CatalogCache>,
    /// Serializes refreshes; readers never wait on it
    refresh_gate: tokio::sync::Mutex<()>,
}

impl SchemaCatalog {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            current: RwLock::new(None),
            ttl: Self::DEFAULT_TTL,
            cache: None,
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cache(mut self, cache: CatalogCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The snapshot currently in use, if any has been loaded
    pub fn snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn install(&self, snapshot: Arc<CatalogSnapshot>) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(snapshot);
    }

    fn chrono_ttl(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(24))
    }

    pub fn is_stale(&self) -> bool {
        match self.snapshot() {
            Some(snap) => snap.is_expired(self.chrono_ttl(), Utc::now()),
            None => true,
        }
    }

    /// Rebuild the snapshot from the live database, bypassing the TTL.
    ///
    /// On failure the previous snapshot (if any) stays installed and
    /// `CatalogUnavailable` is returned.
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<Arc<CatalogSnapshot>> {
        let database_name = self.database.name().to_string();
        info!("Refreshing schema catalog for '{}'", database_name);

        let tables = match self.read_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                if self.snapshot().is_some() {
                    warn!("Catalog refresh failed, keeping previous snapshot: {}", e);
                } else {
                    warn!("Catalog refresh failed and no snapshot is available: {}", e);
                }
                return Err(e);
            }
        };

        let snapshot = Arc::new(CatalogSnapshot::new(database_name, tables));
        self.install(Arc::clone(&snapshot));
        info!("Catalog refreshed: {} tables", snapshot.tables.len());

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&snapshot) {
                warn!("Failed to persist catalog cache: {}", e);
            }
        }

        Ok(snapshot)
    }

    async fn read_tables(&self) -> Result<Vec<TableSchema>> {
        let names = self
            .database
            .list_tables()
            .await
            .map_err(|e| GuardianError::CatalogUnavailable(e.to_string()))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = self
                .database
                .describe_table(&name)
                .await
                .map_err(|e| GuardianError::CatalogUnavailable(e.to_string()))?;
            tables.push(TableSchema::new(name, columns));
        }
        Ok(tables)
    }

    /// Install the cached snapshot when it is still within the TTL, otherwise
    /// refresh from the database.
    pub async fn load_or_refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        if let Some(cache) = &self.cache {
            match cache.load(self.database.name()) {
                Ok(Some(cached)) if !cached.is_expired(self.chrono_ttl(), Utc::now()) => {
                    info!(
                        "Using cached catalog for '{}' (refreshed {})",
                        cached.database_name, cached.refreshed_at
                    );
                    let cached = Arc::new(cached);
                    self.install(Arc::clone(&cached));
                    return Ok(cached);
                }
                Ok(Some(_)) => info!("Cached catalog expired, refreshing"),
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable catalog cache: {}", e),
            }
        }
        self.refresh().await
    }

    /// Snapshot to validate against: refreshes first when missing or past the
    /// TTL. A failed refresh falls back to the stale snapshot when one exists.
    pub async fn ensure_fresh(&self) -> Result<Arc<CatalogSnapshot>> {
        if !self.is_stale() {
            if let Some(snap) = self.snapshot() {
                return Ok(snap);
            }
        }

        let _gate = self.refresh_gate.lock().await;
        // Another request may have refreshed while we waited
        if !self.is_stale() {
            if let Some(snap) = self.snapshot() {
                return Ok(snap);
            }
        }

        let had_snapshot = self.snapshot().is_some();
        if !had_snapshot && self.cache.is_some() {
            drop(_gate);
            return self.load_or_refresh().await;
        }

        match self.refresh_locked().await {
            Ok(snap) => Ok(snap),
            Err(e) => match self.snapshot() {
                Some(stale) => {
                    warn!("Validating against stale catalog: {}", e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        let snap = self.current_or_unavailable()?;
        Ok(snap.has_table(name))
    }

    /// Raises `UnknownTable` when `table` itself is not in the catalog
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        let snap = self.current_or_unavailable()?;
        snap.has_column(table, column)
    }

    fn current_or_unavailable(&self) -> Result<Arc<CatalogSnapshot>> {
        self.snapshot().ok_or_else(|| {
            GuardianError::CatalogUnavailable("catalog has not been loaded".to_string())
        })
    }
}
