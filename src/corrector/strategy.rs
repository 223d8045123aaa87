//! Table-name correction strategies

use crate::catalog::CatalogSnapshot;
use std::collections::HashMap;
use strsim::jaro_winkler;

/// Proposes a canonical name for a table identifier the generator wrote.
pub trait CorrectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn correct_table(&self, table: &str, catalog: Option<&CatalogSnapshot>) -> Option<String>;
}

/// Fixed table of commonly-confused names. Applied regardless of the catalog.
pub struct FixedAliasCorrection {
    aliases: HashMap<String, String>,
}

impl FixedAliasCorrection {
    pub fn new<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        Self {
            aliases: pairs
                .into_iter()
                .map(|(a, c)| (a.into().to_lowercase(), c.into()))
                .collect(),
        }
    }
}

impl Default for FixedAliasCorrection {
    fn default() -> Self {
        Self::new([
            ("sales_2023", "sales"),
            ("sales_2024", "sales"),
            ("sales_data", "sales"),
            ("sales_table", "sales"),
            ("sale", "sales"),
            ("transactions", "sales"),
            ("customer", "customers"),
            ("clients", "customers"),
            ("product", "products"),
            ("store", "stores"),
            ("orders_table", "orders"),
            ("order_details", "order_items"),
            ("category", "categories"),
        ])
    }
}

impl CorrectionStrategy for FixedAliasCorrection {
    fn name(&self) -> &'static str {
        "fixed_alias"
    }

    fn correct_table(&self, table: &str, _catalog: Option<&CatalogSnapshot>) -> Option<String> {
        self.aliases.get(&table.to_lowercase()).cloned()
    }
}

/// Suggests the closest catalog table for an unknown name. Substitutes only when
/// exactly one table clears the threshold.
pub struct EditDistanceCorrection {
    threshold: f64,
}

impl EditDistanceCorrection {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for EditDistanceCorrection {
    fn default() -> Self {
        Self::new(0.92)
    }
}

impl CorrectionStrategy for EditDistanceCorrection {
    fn name(&self) -> &'static str {
        "edit_distance"
    }

    fn correct_table(&self, table: &str, catalog: Option<&CatalogSnapshot>) -> Option<String> {
        let catalog = catalog?;
        if catalog.has_table(table) {
            return None;
        }
        let lowered = table.to_lowercase();
        let mut candidates = catalog
            .table_names()
            .filter(|name| jaro_winkler(&lowered, &name.to_lowercase()) >= self.threshold);
        let first = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        Some(first.to_string())
    }
}

/// Closest catalog table, for "did you mean" hints
pub fn closest_table(catalog: &CatalogSnapshot, table: &str) -> Option<String> {
    let lowered = table.to_lowercase();
    catalog
        .table_names()
        .map(|name| (name, jaro_winkler(&lowered, &name.to_lowercase())))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnSchema, TableSchema};

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::new(
            "retail",
            vec![
                TableSchema::new("sales", vec![ColumnSchema::new("amount", "numeric")]),
                TableSchema::new("stores", vec![ColumnSchema::new("store_id", "integer")]),
                TableSchema::new("customers", vec![ColumnSchema::new("customer_id", "integer")]),
            ],
        )
    }

    #[test]
    fn test_fixed_alias_is_case_insensitive() {
        let fixed = FixedAliasCorrection::default();
        assert_eq!(fixed.correct_table("SALES_2024", None).as_deref(), Some("sales"));
        assert_eq!(fixed.correct_table("sales", None), None);
    }

    #[test]
    fn test_edit_distance_needs_unique_match() {
        let fuzzy = EditDistanceCorrection::default();
        let cat = catalog();
        assert_eq!(fuzzy.correct_table("customerss", Some(&cat)).as_deref(), Some("customers"));
        assert_eq!(fuzzy.correct_table("sales", Some(&cat)), None);
        assert_eq!(fuzzy.correct_table("inventory", Some(&cat)), None);
        assert_eq!(fuzzy.correct_table("customerss", None), None);
    }

    #[test]
    fn test_closest_table() {
        assert_eq!(closest_table(&catalog(), "salez").as_deref(), Some("sales"));
        assert_eq!(closest_table(&catalog(), "zzz"), None);
    }
}
