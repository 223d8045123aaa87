mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{orders_table, retail_sqlite, ScriptedDatabase};
use sql_guardian::catalog::{CatalogCache, CatalogSnapshot, ColumnSchema, SchemaCatalog, TableSchema};
use sql_guardian::database::RawRows;
use sql_guardian::GuardianError;
use std::sync::Arc;

fn customers_table() -> TableSchema {
    TableSchema::new(
        "customers",
        vec![
            ColumnSchema::new("customer_id", "integer"),
            ColumnSchema::new("name", "text"),
        ],
    )
}

#[tokio::test]
async fn test_refresh_is_idempotent_without_schema_change() {
    let catalog = SchemaCatalog::new(retail_sqlite());
    let first = catalog.refresh().await.unwrap();
    let second = catalog.refresh().await.unwrap();

    assert!(first.same_content(&second));
    assert!(catalog.has_table("SALES").unwrap());
    assert!(catalog.has_column("sales", "Amount").unwrap());
    assert!(!catalog.has_column("sales", "profit").unwrap());
    assert!(matches!(
        catalog.has_column("returns", "amount"),
        Err(GuardianError::UnknownTable(_))
    ));
}

#[tokio::test]
async fn test_lookups_before_load_are_unavailable() {
    let catalog = SchemaCatalog::new(retail_sqlite());
    assert!(matches!(
        catalog.has_table("sales"),
        Err(GuardianError::CatalogUnavailable(_))
    ));
}

#[tokio::test]
async fn test_unexpired_cache_is_used_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("catalog.db");

    let original = SchemaCatalog::new(Arc::new(ScriptedDatabase::new(
        vec![orders_table()],
        RawRows::default(),
    )))
    .with_cache(CatalogCache::open(&path).unwrap());
    let stored = original.refresh().await.unwrap();
    assert!(path.exists());

    // Same database name, different live schema: the cached snapshot wins
    let restarted = SchemaCatalog::new(Arc::new(ScriptedDatabase::new(
        vec![customers_table()],
        RawRows::default(),
    )))
    .with_cache(CatalogCache::open(&path).unwrap());
    let loaded = restarted.load_or_refresh().await.unwrap();

    assert!(loaded.same_content(&stored));
    assert!(restarted.has_table("orders").unwrap());
    assert!(!restarted.has_table("customers").unwrap());
}

#[tokio::test]
async fn test_expired_cache_triggers_refresh() {
    let cache = CatalogCache::open_in_memory().unwrap();
    let old = CatalogSnapshot::with_timestamp(
        "scripted",
        vec![orders_table()],
        Utc::now() - ChronoDuration::hours(48),
    );
    cache.store(&old).unwrap();

    let catalog = SchemaCatalog::new(Arc::new(ScriptedDatabase::new(
        vec![customers_table()],
        RawRows::default(),
    )))
    .with_cache(cache);
    let snapshot = catalog.load_or_refresh().await.unwrap();

    assert!(snapshot.has_table("customers"));
    assert!(!snapshot.has_table("orders"));
    assert!(snapshot.refreshed_at > old.refreshed_at);
}
