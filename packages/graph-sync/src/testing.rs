//! Testing utilities: a fault-injecting store wrapper and sample documents.
//!
//! These are useful for testing applications that use the graph sync library
//! without a real database.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{GraphError, GraphResult};
use crate::traits::store::{EdgePattern, GraphStore, NodePattern, StoredEdge, UpsertOutcome};
use crate::types::{Entity, EntityId, Relationship, Triple};

/// Record of a call made through a [`FlakyStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Ping,
    UpsertNode { id: EntityId },
    UpsertEdge { triple: Triple },
    GetNode { id: EntityId },
    FindNodes,
    MatchEdges,
    CollapseEdges { triple: Triple },
}

/// Wraps a store and injects transient failures.
///
/// - `new(inner, n)` fails the first `n` calls of any kind, then delegates
/// - `failing_node(inner, id)` always fails upserts of one node
pub struct FlakyStore<S> {
    inner: S,
    remaining_failures: AtomicUsize,
    failing_node: Option<EntityId>,
    calls: Arc<RwLock<Vec<StoreCall>>>,
}

impl<S: GraphStore> FlakyStore<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(failures),
            failing_node: None,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn failing_node(inner: S, id: EntityId) -> Self {
        Self {
            failing_node: Some(id),
            ..Self::new(inner, 0)
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn record(&self, call: StoreCall) -> GraphResult<()> {
        self.calls.write().unwrap().push(call);
        let injected = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GraphError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: GraphStore> GraphStore for FlakyStore<S> {
    async fn ping(&self) -> GraphResult<()> {
        self.record(StoreCall::Ping)?;
        self.inner.ping().await
    }

    async fn upsert_node(&self, entity: &Entity) -> GraphResult<UpsertOutcome> {
        self.record(StoreCall::UpsertNode {
            id: entity.id.clone(),
        })?;
        if self.failing_node.as_ref() == Some(&entity.id) {
            return Err(GraphError::Unavailable(format!("{} is unwritable", entity.id)));
        }
        self.inner.upsert_node(entity).await
    }

    async fn upsert_edge(&self, relationship: &Relationship) -> GraphResult<UpsertOutcome> {
        self.record(StoreCall::UpsertEdge {
            triple: relationship.triple.clone(),
        })?;
        self.inner.upsert_edge(relationship).await
    }

    async fn get_node(&self, id: &EntityId) -> GraphResult<Option<Entity>> {
        self.record(StoreCall::GetNode { id: id.clone() })?;
        self.inner.get_node(id).await
    }

    async fn find_nodes(&self, pattern: &NodePattern) -> GraphResult<Vec<Entity>> {
        self.record(StoreCall::FindNodes)?;
        self.inner.find_nodes(pattern).await
    }

    async fn match_edges(&self, pattern: &EdgePattern) -> GraphResult<Vec<StoredEdge>> {
        self.record(StoreCall::MatchEdges)?;
        self.inner.match_edges(pattern).await
    }

    async fn collapse_edges(&self, triple: &Triple) -> GraphResult<usize> {
        self.record(StoreCall::CollapseEdges {
            triple: triple.clone(),
        })?;
        self.inner.collapse_edges(triple).await
    }
}

/// Sample organization profiles.
pub mod fixtures {
    use super::*;

    /// Units, nested programs, courses under program headings, faculty under
    /// unit subheaders, a research lab, accreditation and metadata.
    pub const OREGON_PROFILE: &str = r#"# Oregon State University

## University Overview

Oregon State University is a public land-grant research university located in Corvallis, Oregon. Founded in 1868, it enrolls 35,000 students.
The forestry program is accredited by the Society of American Foresters (SAF).

## Academic Departments

- Department of Forest Engineering: Forest operations, GIS and remote sensing research
  - BS Forestry
  - MS Forest Engineering
- Computer Science Department
  - GIS Certificate

## Graduate Programs

- Data Science (MS): machine learning and spatial analysis

## Course Offerings

- BS Forestry
  - FOR 101: Introduction to Forestry
  - FOR 341 (Forest Ecology)
- Data Science (MS)
  - CS 540 / Machine Learning
- GEOG 4050 - Remote Sensing of Environment

## Faculty

### Department of Forest Engineering

- Dr. Jane Smith, Associate Professor (Department of Forest Engineering): LiDAR, drones, forest inventory
- Bob Jones — Research Associate

### Computer Science Department

- Alan Turing, Professor: machine learning; artificial intelligence

## Research Centers

- Spatial Ecology Lab: drone surveys and GIS mapping

## Accreditation

- BS Forestry (SAF)

## Research Highlights

The university operates a GIS mapping facility.
"#;

    /// Shares "Computer Science Department" with [`OREGON_PROFILE`] under
    /// different casing.
    pub const IDAHO_PROFILE: &str = r#"# University of Idaho

## Overview

The University of Idaho is a public research university.
Location: Moscow, Idaho
Founded in 1889.

## Academic Units

- computer science DEPARTMENT: software engineering and artificial intelligence
  - MS Computer Science
- College of Natural Resources
  - BS Forest Resources
  - Graduate Certificate in Remote Sensing

## Courses

- MS Computer Science
  - CS 572: Machine Learning Systems
- FOR 375 (Forest Inventory and Drones)

## Faculty

### College of Natural Resources

- Dr. Maria Lopez, Professor: LiDAR, remote sensing
"#;

    /// No recognizable units, programs, courses or people.
    pub const EMPTY_PROFILE: &str = "# Nowhere College\n\nA small college with a long history.\n";

    /// File names matching the organization display names.
    pub const OREGON_FILE: &str = "Oregon_State_University.md";
    pub const IDAHO_FILE: &str = "University_of_Idaho.md";

    /// Write the two sample profiles into `dir`.
    pub fn write_corpus(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        [(OREGON_FILE, OREGON_PROFILE), (IDAHO_FILE, IDAHO_PROFILE)]
            .into_iter()
            .map(|(name, text)| {
                let path = dir.join(name);
                std::fs::write(&path, text)?;
                Ok(path)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryGraphStore;
    use crate::types::EntityKind;

    #[tokio::test]
    async fn test_flaky_store_fails_then_recovers() {
        let store = FlakyStore::new(MemoryGraphStore::new(), 2);
        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_ok());
        assert_eq!(store.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_node_only_fails_that_id() {
        let bad = EntityId::new(EntityKind::Unit, "Geography");
        let store = FlakyStore::failing_node(MemoryGraphStore::new(), bad.clone());
        let geography = Entity::new(EntityKind::Unit, "Geography", "a.md");
        let forestry = Entity::new(EntityKind::Unit, "Forestry", "a.md");

        let err = store.upsert_node(&geography).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.upsert_node(&forestry).await.is_ok());
        assert_eq!(store.inner().node_count(), 1);
        assert_eq!(store.calls()[0], StoreCall::UpsertNode { id: bad });
    }

    #[test]
    fn test_write_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixtures::write_corpus(dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_file()));
    }
}
