//! In-memory graph store for testing and development.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{GraphError, GraphResult};
use crate::stores::merge_node;
use crate::traits::store::{EdgePattern, GraphStore, NodePattern, StoredEdge, UpsertOutcome};
use crate::types::{Entity, EntityId, Relationship, Triple};

/// In-memory property graph.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart. Edges are kept per copy, so duplicates
/// planted with [`MemoryGraphStore::insert_duplicate_edge`] are visible
/// to the auditor exactly like duplicates in a real database.
pub struct MemoryGraphStore {
    nodes: RwLock<BTreeMap<EntityId, Entity>>,
    edges: RwLock<BTreeMap<u64, Relationship>>,
    next_edge_id: AtomicU64,
    offline: AtomicBool,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> GraphError {
    GraphError::decode("memory store lock poisoned")
}

impl MemoryGraphStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(BTreeMap::new()),
            next_edge_id: AtomicU64::new(1),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable store. Every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> GraphResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(GraphError::Unavailable("memory store is offline".into()))
        } else {
            Ok(())
        }
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    /// Number of stored edge copies.
    pub fn edge_count(&self) -> usize {
        self.edges.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Append another copy of an edge without merging.
    pub fn insert_duplicate_edge(&self, relationship: &Relationship) -> GraphResult<()> {
        let id = self.next_edge_id.fetch_add(1, Ordering::SeqCst);
        self.edges
            .write()
            .map_err(poisoned)?
            .insert(id, relationship.clone());
        Ok(())
    }

    /// Delete every copy of a triple. Returns how many were removed.
    pub fn remove_edges(&self, triple: &Triple) -> GraphResult<usize> {
        let mut edges = self.edges.write().map_err(poisoned)?;
        let before = edges.len();
        edges.retain(|_, r| &r.triple != triple);
        Ok(before - edges.len())
    }

    /// Delete a node and every edge touching it.
    pub fn remove_node(&self, id: &EntityId) -> GraphResult<bool> {
        let removed = self.nodes.write().map_err(poisoned)?.remove(id).is_some();
        self.edges
            .write()
            .map_err(poisoned)?
            .retain(|_, r| !r.touches(id));
        Ok(removed)
    }

    /// Clear all stored data.
    pub fn clear(&self) -> GraphResult<()> {
        self.nodes.write().map_err(poisoned)?.clear();
        self.edges.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn ping(&self) -> GraphResult<()> {
        self.check_online()
    }

    async fn upsert_node(&self, entity: &Entity) -> GraphResult<UpsertOutcome> {
        self.check_online()?;
        let mut nodes = self.nodes.write().map_err(poisoned)?;
        let (write, outcome) = merge_node(nodes.get(&entity.id), entity);
        if let Some(node) = write {
            nodes.insert(node.id.clone(), node);
        }
        Ok(outcome)
    }

    async fn upsert_edge(&self, relationship: &Relationship) -> GraphResult<UpsertOutcome> {
        self.check_online()?;
        let triple = &relationship.triple;
        triple
            .validate()
            .map_err(|reason| GraphError::InvalidRelationship {
                triple: triple.to_string(),
                reason,
            })?;

        {
            let nodes = self.nodes.read().map_err(poisoned)?;
            for id in [&triple.source, &triple.target] {
                if !nodes.contains_key(id) {
                    return Err(GraphError::MissingEndpoint { id: id.to_string() });
                }
            }
        }

        let mut edges = self.edges.write().map_err(poisoned)?;
        if let Some(existing) = edges.values_mut().find(|r| &r.triple == triple) {
            if existing.origin_document == relationship.origin_document {
                return Ok(UpsertOutcome::Unchanged);
            }
            existing.origin_document = relationship.origin_document.clone();
            return Ok(UpsertOutcome::Updated);
        }

        let id = self.next_edge_id.fetch_add(1, Ordering::SeqCst);
        edges.insert(id, relationship.clone());
        Ok(UpsertOutcome::Created)
    }

    async fn get_node(&self, id: &EntityId) -> GraphResult<Option<Entity>> {
        self.check_online()?;
        Ok(self.nodes.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn find_nodes(&self, pattern: &NodePattern) -> GraphResult<Vec<Entity>> {
        self.check_online()?;
        Ok(self
            .nodes
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|e| pattern.matches(e))
            .cloned()
            .collect())
    }

    async fn match_edges(&self, pattern: &EdgePattern) -> GraphResult<Vec<StoredEdge>> {
        self.check_online()?;
        Ok(self
            .edges
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|(_, r)| pattern.matches(&r.triple))
            .map(|(id, r)| StoredEdge {
                edge_id: format!("e{id}"),
                relationship: r.clone(),
            })
            .collect())
    }

    async fn collapse_edges(&self, triple: &Triple) -> GraphResult<usize> {
        self.check_online()?;
        let mut edges = self.edges.write().map_err(poisoned)?;
        let extra: Vec<u64> = edges
            .iter()
            .filter(|(_, r)| &r.triple == triple)
            .map(|(id, _)| *id)
            .skip(1)
            .collect();
        for id in &extra {
            edges.remove(id);
        }
        Ok(extra.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityKind, RelationKind};

    fn unit_and_program() -> (Entity, Entity, Relationship) {
        let unit = Entity::new(EntityKind::Unit, "Forestry Department", "a.md");
        let program = Entity::new(EntityKind::Program, "BS Forestry", "a.md");
        let rel = Relationship::new(unit.id.clone(), RelationKind::Offers, program.id.clone(), "a.md");
        (unit, program, rel)
    }

    #[tokio::test]
    async fn test_upsert_node_is_idempotent() {
        let store = MemoryGraphStore::new();
        let (unit, _, _) = unit_and_program();
        assert_eq!(store.upsert_node(&unit).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_node(&unit).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(store.node_count(), 1);
    }

    #[tokio::test]
    async fn test_upsert_edge_merges_by_triple() {
        let store = MemoryGraphStore::new();
        let (unit, program, rel) = unit_and_program();
        store.upsert_node(&unit).await.unwrap();
        store.upsert_node(&program).await.unwrap();

        assert_eq!(store.upsert_edge(&rel).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_edge(&rel).await.unwrap(), UpsertOutcome::Unchanged);
        let mut moved = rel.clone();
        moved.origin_document = "b.md".into();
        assert_eq!(store.upsert_edge(&moved).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.edge_count(), 1);
    }

    #[tokio::test]
    async fn test_upsert_edge_rejects_missing_endpoint_and_bad_kinds() {
        let store = MemoryGraphStore::new();
        let (unit, program, rel) = unit_and_program();
        store.upsert_node(&unit).await.unwrap();
        assert!(matches!(
            store.upsert_edge(&rel).await,
            Err(GraphError::MissingEndpoint { .. })
        ));

        store.upsert_node(&program).await.unwrap();
        let backwards = Relationship::new(program.id, RelationKind::Offers, unit.id, "a.md");
        assert!(matches!(
            store.upsert_edge(&backwards).await,
            Err(GraphError::InvalidRelationship { .. })
        ));
    }

    #[tokio::test]
    async fn test_collapse_keeps_one_copy() {
        let store = MemoryGraphStore::new();
        let (unit, program, rel) = unit_and_program();
        store.upsert_node(&unit).await.unwrap();
        store.upsert_node(&program).await.unwrap();
        store.upsert_edge(&rel).await.unwrap();
        store.insert_duplicate_edge(&rel).unwrap();
        store.insert_duplicate_edge(&rel).unwrap();

        let copies = store.match_edges(&EdgePattern::triple(&rel.triple)).await.unwrap();
        assert_eq!(copies.len(), 3);
        assert_eq!(store.collapse_edges(&rel.triple).await.unwrap(), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.collapse_edges(&rel.triple).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_is_unavailable() {
        let store = MemoryGraphStore::new();
        store.set_offline(true);
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, GraphError::Unavailable(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_remove_node_detaches_edges() {
        let store = MemoryGraphStore::new();
        let (unit, program, rel) = unit_and_program();
        store.upsert_node(&unit).await.unwrap();
        store.upsert_node(&program).await.unwrap();
        store.upsert_edge(&rel).await.unwrap();
        assert!(store.remove_node(&program.id).unwrap());
        assert_eq!(store.edge_count(), 0);
        assert_eq!(store.find_nodes(&NodePattern::all()).await.unwrap().len(), 1);
    }
}
