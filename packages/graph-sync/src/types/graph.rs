//! A batch of entities and relationships headed for the store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind};
use super::relationship::{RelationKind, Relationship, Triple};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphBatch {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl GraphBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity unless one with the same id is already present.
    pub fn push_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id.clone();
        if !self.contains(&id) {
            self.entities.push(entity);
        }
        id
    }

    /// Add a relationship unless its triple is already present.
    pub fn push_relationship(&mut self, relationship: Relationship) {
        if !self
            .relationships
            .iter()
            .any(|r| r.triple == relationship.triple)
        {
            self.relationships.push(relationship);
        }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.iter().any(|e| &e.id == id)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    pub fn triples(&self) -> BTreeSet<Triple> {
        self.relationships.iter().map(|r| r.triple.clone()).collect()
    }

    pub fn entity_counts(&self) -> BTreeMap<EntityKind, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entities {
            *counts.entry(e.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn relationship_counts(&self) -> BTreeMap<RelationKind, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.relationships {
            *counts.entry(r.triple.kind).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_dedups_by_id_and_triple() {
        let mut batch = GraphBatch::new();
        let org = batch.push_entity(Entity::new(EntityKind::Organization, "Test U", "a.md"));
        let unit = batch.push_entity(Entity::new(EntityKind::Unit, "Forestry Dept", "a.md"));
        batch.push_entity(Entity::new(EntityKind::Unit, "forestry dept", "a.md"));
        batch.push_relationship(Relationship::new(org.clone(), RelationKind::Locates, unit.clone(), "a.md"));
        batch.push_relationship(Relationship::new(org, RelationKind::Locates, unit, "a.md"));
        assert_eq!(batch.entities.len(), 2);
        assert_eq!(batch.relationships.len(), 1);
        assert_eq!(batch.entity_counts()[&EntityKind::Unit], 1);
    }
}
