//! Schema context handed to the SQL generator

use crate::catalog::{CatalogSnapshot, TableSchema};
use crate::relationships::RelationshipGraph;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaContext {
    pub database_name: String,
    pub tables: Vec<TableSchema>,
    /// `FROM a <kind> JOIN b ON ...` for every declared relationship whose
    /// tables both exist
    pub join_hints: Vec<String>,
}

impl SchemaContext {
    pub fn build(snapshot: &CatalogSnapshot, graph: &RelationshipGraph) -> Self {
        let join_hints = graph
            .relationships()
            .iter()
            .filter(|r| snapshot.has_table(&r.source_table) && snapshot.has_table(&r.target_table))
            .filter_map(|r| {
                graph
                    .build_join_clause(&r.source_table, &r.target_table)
                    .map(|clause| format!("FROM {} {}", r.source_table, clause))
            })
            .collect();

        Self {
            database_name: snapshot.database_name.clone(),
            tables: snapshot.tables.values().cloned().collect(),
            join_hints,
        }
    }

    /// Plain-text rendering for prompt assembly
    pub fn render(&self) -> String {
        let mut out = format!("Database: {}\n", self.database_name);
        for table in &self.tables {
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .join(", ");
            out.push_str(&format!("Table {} ({})\n", table.name, columns));
        }
        if !self.join_hints.is_empty() {
            out.push_str("Joins:\n");
            for hint in &self.join_hints {
                out.push_str(&format!("  {}\n", hint));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnSchema;
    use crate::relationships::default_relationships;

    #[test]
    fn test_only_existing_tables_get_join_hints() {
        let snapshot = CatalogSnapshot::new(
            "retail",
            vec![
                TableSchema::new(
                    "sales",
                    vec![
                        ColumnSchema::new("customer_id", "integer"),
                        ColumnSchema::new("amount", "numeric"),
                    ],
                ),
                TableSchema::new("customers", vec![ColumnSchema::new("customer_id", "integer")]),
            ],
        );
        let ctx = SchemaContext::build(&snapshot, &RelationshipGraph::new(default_relationships()));
        assert_eq!(
            ctx.join_hints,
            vec!["FROM sales INNER JOIN customers ON sales.customer_id = customers.customer_id"]
        );
        let rendered = ctx.render();
        assert!(rendered.contains("Table sales (customer_id integer, amount numeric)"));
        assert!(rendered.starts_with("Database: retail"));
    }
}
