//! Relationship Graph
//!
//! Known foreign-key style relationships between tables, used to synthesize
//! join clauses. Built once from a static list and never mutated afterwards,
//! so it can be shared freely between requests.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Join kind declared for a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        }
    }
}

/// `source_table.source_column -> target_table.target_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_column: String,
    pub join_kind: JoinKind,
}

impl Relationship {
    pub fn new(
        source: (&str, &str),
        target: (&str, &str),
        join_kind: JoinKind,
    ) -> Self {
        Self {
            source_table: source.0.to_string(),
            source_column: source.1.to_string(),
            target_table: target.0.to_string(),
            target_column: target.1.to_string(),
            join_kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDirection {
    Forward,
    Reverse,
}

/// One directed edge. Reverse edges carry the declared join kind unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub join_kind: JoinKind,
    pub direction: EdgeDirection,
}

impl JoinEdge {
    pub fn join_clause(&self) -> String {
        format!(
            "{} JOIN {} ON {}.{} = {}.{}",
            self.join_kind.as_sql(),
            self.to_table,
            self.from_table,
            self.from_column,
            self.to_table,
            self.to_column
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    forward: HashMap<String, Vec<JoinEdge>>,
    reverse: HashMap<String, Vec<JoinEdge>>,
    relationships: Vec<Relationship>,
}

impl RelationshipGraph {
    pub fn new(relationships: Vec<Relationship>) -> Self {
        let mut forward: HashMap<String, Vec<JoinEdge>> = HashMap::new();
        let mut reverse: HashMap<String, Vec<JoinEdge>> = HashMap::new();

        for rel in &relationships {
            forward
                .entry(rel.source_table.to_lowercase())
                .or_default()
                .push(JoinEdge {
                    from_table: rel.source_table.clone(),
                    from_column: rel.source_column.clone(),
                    to_table: rel.target_table.clone(),
                    to_column: rel.target_column.clone(),
                    join_kind: rel.join_kind,
                    direction: EdgeDirection::Forward,
                });
            reverse
                .entry(rel.target_table.to_lowercase())
                .or_default()
                .push(JoinEdge {
                    from_table: rel.target_table.clone(),
                    from_column: rel.target_column.clone(),
                    to_table: rel.source_table.clone(),
                    to_column: rel.source_column.clone(),
                    join_kind: rel.join_kind,
                    direction: EdgeDirection::Reverse,
                });
        }

        Self {
            forward,
            reverse,
            relationships,
        }
    }

    /// Load relationships from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let relationships: Vec<Relationship> = serde_json::from_str(&content)?;
        Ok(Self::new(relationships))
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// All forward edges in declaration order, then all reverse edges in
    /// declaration order.
    pub fn relationships_for(&self, table: &str) -> Vec<&JoinEdge> {
        let key = table.to_lowercase();
        self.forward
            .get(&key)
            .into_iter()
            .flatten()
            .chain(self.reverse.get(&key).into_iter().flatten())
            .collect()
    }

    /// `<kind> JOIN to ON from.col = to.col`, or `None` when the tables are not
    /// related. `None` means "omit this join", not a failure.
    pub fn build_join_clause(&self, from_table: &str, to_table: &str) -> Option<String> {
        self.relationships_for(from_table)
            .into_iter()
            .find(|edge| edge.to_table.eq_ignore_ascii_case(to_table))
            .map(JoinEdge::join_clause)
    }
}

/// Relationships of the retail schema the service ships with
pub fn default_relationships() -> Vec<Relationship> {
    vec![
        Relationship::new(("sales", "customer_id"), ("customers", "customer_id"), JoinKind::Inner),
        Relationship::new(("sales", "product_id"), ("products", "product_id"), JoinKind::Inner),
        Relationship::new(("sales", "store_id"), ("stores", "store_id"), JoinKind::Left),
        Relationship::new(("orders", "customer_id"), ("customers", "customer_id"), JoinKind::Inner),
        Relationship::new(("order_items", "order_id"), ("orders", "order_id"), JoinKind::Inner),
        Relationship::new(("order_items", "product_id"), ("products", "product_id"), JoinKind::Inner),
        Relationship::new(("products", "category_id"), ("categories", "category_id"), JoinKind::Left),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> RelationshipGraph {
        RelationshipGraph::new(default_relationships())
    }

    #[test]
    fn test_forward_join_clause() {
        assert_eq!(
            graph().build_join_clause("sales", "customers").as_deref(),
            Some("INNER JOIN customers ON sales.customer_id = customers.customer_id")
        );
    }

    #[test]
    fn test_reverse_edge_keeps_declared_kind() {
        assert_eq!(
            graph().build_join_clause("stores", "sales").as_deref(),
            Some("LEFT JOIN sales ON stores.store_id = sales.store_id")
        );
    }

    #[test]
    fn test_unrelated_tables_yield_none() {
        assert_eq!(graph().build_join_clause("stores", "categories"), None);
        assert_eq!(graph().build_join_clause("nowhere", "sales"), None);
    }

    #[test]
    fn test_edge_order_forward_then_reverse() {
        let g = graph();
        let edges = g.relationships_for("customers");
        assert!(edges.iter().all(|e| e.direction == EdgeDirection::Reverse));
        let targets: Vec<&str> = edges.iter().map(|e| e.to_table.as_str()).collect();
        assert_eq!(targets, vec!["sales", "orders"]);

        let products = g.relationships_for("products");
        let dirs: Vec<EdgeDirection> = products.iter().map(|e| e.direction).collect();
        assert_eq!(
            dirs,
            vec![EdgeDirection::Forward, EdgeDirection::Reverse, EdgeDirection::Reverse]
        );
        assert_eq!(products[0].to_table, "categories");
        assert_eq!(products[1].to_table, "sales");
        assert_eq!(products[2].to_table, "order_items");
    }

    #[test]
    fn test_load_from_json() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("relationships.json");
        std::fs::write(
            &path,
            r#"[{"source_table":"a","source_column":"b_id","target_table":"b","target_column":"id","join_kind":"left"}]"#,
        )
        .unwrap();
        let g = RelationshipGraph::from_json_file(&path).unwrap();
        assert_eq!(
            g.build_join_clause("a", "b").as_deref(),
            Some("LEFT JOIN b ON a.b_id = b.id")
        );
    }
}
