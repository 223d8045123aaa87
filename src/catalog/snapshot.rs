//! Immutable catalog snapshot

use crate::error::{GuardianError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        let t = self.data_type.to_lowercase();
        if t.contains("interval") || t.contains("point") {
            return false;
        }
        ["int", "numeric", "decimal", "real", "double", "float", "money", "serial"]
            .iter()
            .any(|k| t.contains(k))
    }

    pub fn is_temporal(&self) -> bool {
        let t = self.data_type.to_lowercase();
        t.contains("date") || t.contains("time")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Table metadata for one database at one point in time.
///
/// Never mutated after construction; a refresh builds a new snapshot and the
/// catalog swaps the `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub database_name: String,
    /// Keyed by lower-cased table name
    pub tables: BTreeMap<String, TableSchema>,
    pub refreshed_at: DateTime<Utc>,
}

impl CatalogSnapshot {
    pub fn new(database_name: impl Into<String>, tables: Vec<TableSchema>) -> Self {
        Self::with_timestamp(database_name, tables, Utc::now())
    }

    pub fn with_timestamp(
        database_name: impl Into<String>,
        tables: Vec<TableSchema>,
        refreshed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            tables: tables
                .into_iter()
                .map(|t| (t.name.to_lowercase(), t))
                .collect(),
            refreshed_at,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    /// Column lookups presuppose a known table: an unknown table is an error,
    /// not `false`.
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.table(table)
            .map(|t| t.column(column).is_some())
            .ok_or_else(|| GuardianError::UnknownTable(table.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(|t| t.name.as_str())
    }

    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.refreshed_at > ttl
    }

    /// Equal tables, ignoring the refresh timestamp
    pub fn same_content(&self, other: &CatalogSnapshot) -> bool {
        self.database_name == other.database_name && self.tables == other.tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot::new(
            "retail",
            vec![TableSchema::new(
                "Sales",
                vec![
                    ColumnSchema::new("amount", "numeric"),
                    ColumnSchema::new("sale_date", "date"),
                ],
            )],
        )
    }

    #[test]
    fn test_lookups_are_case_insensitive() {
        let snap = snapshot();
        assert!(snap.has_table("sales"));
        assert!(snap.has_table("SALES"));
        assert!(snap.has_column("sales", "AMOUNT").unwrap());
        assert!(!snap.has_column("sales", "qty").unwrap());
    }

    #[test]
    fn test_has_column_on_unknown_table_is_an_error() {
        let snap = snapshot();
        match snap.has_column("orders", "amount") {
            Err(GuardianError::UnknownTable(t)) => assert_eq!(t, "orders"),
            other => panic!("expected UnknownTable, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry() {
        let snap = snapshot();
        let ttl = chrono::Duration::hours(24);
        assert!(!snap.is_expired(ttl, snap.refreshed_at + chrono::Duration::hours(23)));
        assert!(snap.is_expired(ttl, snap.refreshed_at + chrono::Duration::hours(25)));
    }

    #[test]
    fn test_column_type_families() {
        assert!(ColumnSchema::new("a", "double precision").is_numeric());
        assert!(ColumnSchema::new("a", "INTEGER").is_numeric());
        assert!(!ColumnSchema::new("a", "text").is_numeric());
        assert!(ColumnSchema::new("a", "timestamp with time zone").is_temporal());
    }
}
