//! Storage implementations for the graph sync library.
//!
//! Available backends:
//! - `MemoryGraphStore` - In-memory graph (always available)
//! - `SqliteGraphStore` - SQLite node/edge tables (requires `sqlite` feature)
//! - `Neo4jGraphStore` - Neo4j via Cypher `MERGE` (requires `neo4j` feature)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "neo4j")]
pub mod neo4j;

pub use memory::MemoryGraphStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGraphStore;

#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jGraphStore;

use crate::traits::store::UpsertOutcome;
use crate::types::Entity;

/// Merge an incoming node over the stored one with `SET n += props` semantics.
///
/// Returns the node to write, or `None` when nothing would change.
pub(crate) fn merge_node(
    existing: Option<&Entity>,
    incoming: &Entity,
) -> (Option<Entity>, UpsertOutcome) {
    let Some(existing) = existing else {
        return (Some(incoming.clone()), UpsertOutcome::Created);
    };
    let mut merged = existing.clone();
    merged.kind = incoming.kind;
    merged.name = incoming.name.clone();
    merged.origin_document = incoming.origin_document.clone();
    for (key, value) in &incoming.properties {
        merged.properties.insert(key.clone(), value.clone());
    }
    if &merged == existing {
        (None, UpsertOutcome::Unchanged)
    } else {
        (Some(merged), UpsertOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;

    #[test]
    fn test_merge_node_outcomes() {
        let a = Entity::new(EntityKind::Unit, "Forestry Dept", "a.md").with_property("focus", "GIS");
        assert_eq!(merge_node(None, &a).1, UpsertOutcome::Created);
        assert_eq!(merge_node(Some(&a), &a), (None, UpsertOutcome::Unchanged));

        let b = Entity::new(EntityKind::Unit, "Forestry Dept", "a.md").with_property("description", "Trees");
        let (merged, outcome) = merge_node(Some(&a), &b);
        assert_eq!(outcome, UpsertOutcome::Updated);
        let merged = merged.unwrap();
        assert_eq!(merged.property_str("focus"), Some("GIS"));
        assert_eq!(merged.property_str("description"), Some("Trees"));
    }
}
