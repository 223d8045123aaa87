//! Catalog Cache - local persistence of catalog snapshots
//!
//! One row per database name in a SQLite file, so an unexpired catalog can be
//! installed at startup without a live schema query.

use super::snapshot::{CatalogSnapshot, TableSchema};
use crate::error::{GuardianError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct CatalogCache {
    path: Option<PathBuf>,
    db: Mutex<Connection>,
}

impl CatalogCache {
    /// Open or create the cache file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Connection::open(&path)?;
        let cache = Self {
            path: Some(path),
            db: Mutex::new(db),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let cache = Self {
            path: None,
            db: Mutex::new(Connection::open_in_memory()?),
        };
        cache.init_schema()?;
        Ok(cache)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS catalog_cache (
                database_name TEXT PRIMARY KEY,
                refreshed_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(())
    }

    /// Cached snapshot for a database, whatever its age
    pub fn load(&self, database_name: &str) -> Result<Option<CatalogSnapshot>> {
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        let row: Option<(String, String)> = db
            .query_row(
                "SELECT refreshed_at, payload FROM catalog_cache WHERE database_name = ?1",
                params![database_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((refreshed_at, payload)) = row else {
            debug!("No cached catalog for '{}'", database_name);
            return Ok(None);
        };

        let refreshed_at = DateTime::parse_from_rfc3339(&refreshed_at)
            .map_err(|e| GuardianError::Cache(format!("Bad refresh timestamp: {}", e)))?
            .with_timezone(&Utc);
        let tables: Vec<TableSchema> = serde_json::from_str(&payload)?;

        Ok(Some(CatalogSnapshot::with_timestamp(
            database_name,
            tables,
            refreshed_at,
        )))
    }

    pub fn store(&self, snapshot: &CatalogSnapshot) -> Result<()> {
        let tables: Vec<&TableSchema> = snapshot.tables.values().collect();
        let payload = serde_json::to_string(&tables)?;
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.execute(
            r#"
            INSERT INTO catalog_cache (database_name, refreshed_at, payload)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(database_name) DO UPDATE SET
                refreshed_at = excluded.refreshed_at,
                payload = excluded.payload
            "#,
            params![
                snapshot.database_name,
                snapshot.refreshed_at.to_rfc3339(),
                payload
            ],
        )?;
        debug!(
            "Cached catalog for '{}' ({} tables)",
            snapshot.database_name,
            snapshot.tables.len()
        );
        Ok(())
    }
}
