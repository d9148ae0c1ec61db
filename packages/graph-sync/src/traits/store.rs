//! The graph store abstraction.
//!
//! A store is a keyed property graph:
//! - nodes are merged by [`EntityId`] with property overwrite
//! - edges are merged by [`Triple`] and carry only provenance
//!
//! Stores must not enforce triple uniqueness themselves beyond the merge in
//! [`GraphStore::upsert_edge`]: duplicates written by other tools have to stay
//! visible to [`GraphStore::match_edges`] so the auditor can find them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GraphResult;
use crate::types::{Entity, EntityId, EntityKind, RelationKind, Relationship, Triple};

/// What a single upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Node query scoped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePattern {
    pub kind: Option<EntityKind>,
}

impl NodePattern {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(kind: EntityKind) -> Self {
        Self { kind: Some(kind) }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.kind.map_or(true, |k| k == entity.kind)
    }
}

/// Edge query by endpoint kinds, relation and endpoints. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgePattern {
    pub source_kind: Option<EntityKind>,
    pub relation: Option<RelationKind>,
    pub target_kind: Option<EntityKind>,
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
}

impl EdgePattern {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn relation(relation: RelationKind) -> Self {
        Self {
            relation: Some(relation),
            ..Default::default()
        }
    }

    /// Exactly one triple.
    pub fn triple(triple: &Triple) -> Self {
        Self {
            relation: Some(triple.kind),
            source: Some(triple.source.clone()),
            target: Some(triple.target.clone()),
            ..Default::default()
        }
    }

    pub fn with_source_kind(mut self, kind: EntityKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    pub fn with_target_kind(mut self, kind: EntityKind) -> Self {
        self.target_kind = Some(kind);
        self
    }

    pub fn with_source(mut self, id: EntityId) -> Self {
        self.source = Some(id);
        self
    }

    pub fn with_target(mut self, id: EntityId) -> Self {
        self.target = Some(id);
        self
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        self.relation.map_or(true, |r| r == triple.kind)
            && self.source.as_ref().map_or(true, |s| s == &triple.source)
            && self.target.as_ref().map_or(true, |t| t == &triple.target)
            && self
                .source_kind
                .map_or(true, |k| triple.source.kind() == Some(k))
            && self
                .target_kind
                .map_or(true, |k| triple.target.kind() == Some(k))
    }
}

/// One materialized edge. Duplicated triples appear once per copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEdge {
    /// Backend-specific id of this copy
    pub edge_id: String,
    #[serde(flatten)]
    pub relationship: Relationship,
}

/// Keyed property-graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Connectivity probe. Failure here is fatal for a run.
    async fn ping(&self) -> GraphResult<()>;

    /// Merge a node by id, overwriting the given properties.
    async fn upsert_node(&self, entity: &Entity) -> GraphResult<UpsertOutcome>;

    /// Merge an edge by triple. Both endpoints must exist.
    async fn upsert_edge(&self, relationship: &Relationship) -> GraphResult<UpsertOutcome>;

    /// Get a node by id.
    async fn get_node(&self, id: &EntityId) -> GraphResult<Option<Entity>>;

    /// Nodes matching a pattern, ordered by id.
    async fn find_nodes(&self, pattern: &NodePattern) -> GraphResult<Vec<Entity>>;

    /// Every stored copy of every edge matching a pattern.
    async fn match_edges(&self, pattern: &EdgePattern) -> GraphResult<Vec<StoredEdge>>;

    /// Delete all but one copy of a triple. Returns the number removed.
    async fn collapse_edges(&self, triple: &Triple) -> GraphResult<usize>;

    /// Count nodes matching a pattern.
    async fn count_nodes(&self, pattern: &NodePattern) -> GraphResult<usize> {
        Ok(self.find_nodes(pattern).await?.len())
    }

    /// Count edge copies matching a pattern.
    async fn count_edges(&self, pattern: &EdgePattern) -> GraphResult<usize> {
        Ok(self.match_edges(pattern).await?.len())
    }
}

#[async_trait]
impl<T: GraphStore + ?Sized> GraphStore for Arc<T> {
    async fn ping(&self) -> GraphResult<()> {
        (**self).ping().await
    }

    async fn upsert_node(&self, entity: &Entity) -> GraphResult<UpsertOutcome> {
        (**self).upsert_node(entity).await
    }

    async fn upsert_edge(&self, relationship: &Relationship) -> GraphResult<UpsertOutcome> {
        (**self).upsert_edge(relationship).await
    }

    async fn get_node(&self, id: &EntityId) -> GraphResult<Option<Entity>> {
        (**self).get_node(id).await
    }

    async fn find_nodes(&self, pattern: &NodePattern) -> GraphResult<Vec<Entity>> {
        (**self).find_nodes(pattern).await
    }

    async fn match_edges(&self, pattern: &EdgePattern) -> GraphResult<Vec<StoredEdge>> {
        (**self).match_edges(pattern).await
    }

    async fn collapse_edges(&self, triple: &Triple) -> GraphResult<usize> {
        (**self).collapse_edges(triple).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_pattern_matching() {
        let triple = Triple::new(
            EntityId::new(EntityKind::Unit, "Forestry Dept"),
            RelationKind::Offers,
            EntityId::new(EntityKind::Program, "BS Forestry"),
        );
        assert!(EdgePattern::all().matches(&triple));
        assert!(EdgePattern::triple(&triple).matches(&triple));
        assert!(EdgePattern::relation(RelationKind::Offers)
            .with_source_kind(EntityKind::Unit)
            .matches(&triple));
        assert!(!EdgePattern::relation(RelationKind::Locates).matches(&triple));
        assert!(!EdgePattern::all()
            .with_target_kind(EntityKind::Course)
            .matches(&triple));
    }
}
