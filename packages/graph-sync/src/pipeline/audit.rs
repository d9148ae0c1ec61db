//! Consistency auditor: diff the expected graph against the live store.
//!
//! The auditor never writes. It reports entities missing from the store,
//! relationships missing between present endpoints, orphaned entities (not in
//! the corpus, or cut off from every Organization), duplicated relationship
//! copies, and Programs offered by more than one Unit.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GraphResult;
use crate::pipeline::retry::RetryPolicy;
use crate::traits::store::{EdgePattern, GraphStore, NodePattern, StoredEdge};
use crate::types::{
    Entity, EntityId, EntityKind, GraphBatch, OverrideTable, Reattachment, RelationKind,
    Relationship, Triple,
};

/// Why an entity counts as orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanReason {
    /// Present in the store, absent from the expected set
    NotInCorpus,
    /// Expected, but no hierarchy path from any Organization reaches it
    Unreachable,
}

/// One difference between expected and actual state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discrepancy {
    MissingEntity {
        entity: Entity,
        /// Expected relationships that cannot exist until this entity does
        blocked_relationships: Vec<Relationship>,
    },
    MissingRelationship {
        relationship: Relationship,
    },
    OrphanedEntity {
        entity: EntityId,
        kind: EntityKind,
        reason: OrphanReason,
        /// Operator-declared parent to reattach to, if any
        reattach: Option<Reattachment>,
    },
    DuplicateRelationship {
        triple: Triple,
        copies: usize,
    },
    /// A Program must hang under exactly one Unit
    MultipleParents {
        entity: EntityId,
        parents: Vec<EntityId>,
    },
}

impl Discrepancy {
    pub fn kind(&self) -> &'static str {
        match self {
            Discrepancy::MissingEntity { .. } => "missing_entity",
            Discrepancy::MissingRelationship { .. } => "missing_relationship",
            Discrepancy::OrphanedEntity { .. } => "orphaned_entity",
            Discrepancy::DuplicateRelationship { .. } => "duplicate_relationship",
            Discrepancy::MultipleParents { .. } => "multiple_parents",
        }
    }

    /// The entity id or triple the discrepancy is about.
    pub fn target(&self) -> String {
        match self {
            Discrepancy::MissingEntity { entity, .. } => entity.id.to_string(),
            Discrepancy::MissingRelationship { relationship } => relationship.triple.to_string(),
            Discrepancy::OrphanedEntity { entity, .. }
            | Discrepancy::MultipleParents { entity, .. } => entity.to_string(),
            Discrepancy::DuplicateRelationship { triple, .. } => triple.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyCounts {
    pub missing_entity: usize,
    pub missing_relationship: usize,
    pub orphaned_entity: usize,
    pub duplicate_relationship: usize,
    #[serde(default)]
    pub multiple_parents: usize,
}

impl DiscrepancyCounts {
    pub fn total(&self) -> usize {
        self.missing_entity
            + self.missing_relationship
            + self.orphaned_entity
            + self.duplicate_relationship
            + self.multiple_parents
    }
}

/// Result of one audit pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub audited_at: DateTime<Utc>,
    pub expected_entities: usize,
    pub expected_relationships: usize,
    pub actual_entities: usize,
    /// Stored edge copies, duplicates included
    pub actual_relationships: usize,
    pub counts: DiscrepancyCounts,
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditReport {
    /// No missing entities, missing relationships or duplicates.
    pub fn is_closed(&self) -> bool {
        self.counts.missing_entity == 0
            && self.counts.missing_relationship == 0
            && self.counts.duplicate_relationship == 0
    }

    pub fn is_clean(&self) -> bool {
        self.counts.total() == 0
    }

    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Discrepancy> + 'a {
        self.discrepancies.iter().filter(move |d| d.kind() == kind)
    }
}

/// Live graph snapshot read kind by kind.
pub struct Snapshot {
    pub nodes: BTreeMap<EntityId, Entity>,
    pub edges: Vec<StoredEdge>,
}

impl Snapshot {
    /// Read every node and edge, one entity kind / relation kind at a time.
    pub async fn read<S: GraphStore + ?Sized>(store: &S, policy: &RetryPolicy) -> GraphResult<Self> {
        let mut nodes = BTreeMap::new();
        for kind in EntityKind::ALL {
            let pattern = NodePattern::kind(kind);
            for entity in policy.run("find_nodes", || store.find_nodes(&pattern)).await? {
                nodes.insert(entity.id.clone(), entity);
            }
        }
        let mut edges = Vec::new();
        for relation in RelationKind::ALL {
            let pattern = EdgePattern::relation(relation);
            edges.extend(policy.run("match_edges", || store.match_edges(&pattern)).await?);
        }
        Ok(Self { nodes, edges })
    }

    /// Stored copies per triple.
    pub fn copies(&self) -> BTreeMap<&Triple, usize> {
        let mut copies = BTreeMap::new();
        for edge in &self.edges {
            *copies.entry(&edge.relationship.triple).or_insert(0) += 1;
        }
        copies
    }

    /// Entities reachable from any Organization over hierarchy edges
    /// (`locates`, `offers`, `employs`).
    pub fn reachable(&self) -> HashSet<EntityId> {
        let mut children: HashMap<&EntityId, Vec<&EntityId>> = HashMap::new();
        for edge in &self.edges {
            let triple = &edge.relationship.triple;
            if triple.kind.is_hierarchy() {
                children.entry(&triple.source).or_default().push(&triple.target);
            }
        }

        let mut seen: HashSet<EntityId> = HashSet::new();
        let mut queue: VecDeque<&EntityId> = self
            .nodes
            .values()
            .filter(|e| e.kind == EntityKind::Organization)
            .map(|e| &e.id)
            .collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(next) = children.get(id) {
                queue.extend(next.iter().copied());
            }
        }
        seen
    }

    /// Distinct Units offering each Program.
    pub fn program_parents(&self) -> BTreeMap<&EntityId, BTreeSet<&EntityId>> {
        let mut parents: BTreeMap<&EntityId, BTreeSet<&EntityId>> = BTreeMap::new();
        for edge in &self.edges {
            let triple = &edge.relationship.triple;
            if triple.kind == RelationKind::Offers
                && triple.source.kind() == Some(EntityKind::Unit)
                && triple.target.kind() == Some(EntityKind::Program)
            {
                parents.entry(&triple.target).or_default().insert(&triple.source);
            }
        }
        parents
    }
}

fn checks_reachability(kind: EntityKind) -> bool {
    matches!(kind, EntityKind::Unit | EntityKind::Program | EntityKind::Person)
}

/// Compares an expected [`GraphBatch`] with the store.
pub struct Auditor<'a, S: ?Sized> {
    store: &'a S,
    policy: &'a RetryPolicy,
    overrides: &'a OverrideTable,
}

impl<'a, S: GraphStore + ?Sized> Auditor<'a, S> {
    pub fn new(store: &'a S, policy: &'a RetryPolicy, overrides: &'a OverrideTable) -> Self {
        Self {
            store,
            policy,
            overrides,
        }
    }

    pub async fn audit(&self, expected: &GraphBatch) -> GraphResult<AuditReport> {
        let snapshot = Snapshot::read(self.store, self.policy).await?;
        let report = self.compare(expected, &snapshot);
        info!(
            missing_entity = report.counts.missing_entity,
            missing_relationship = report.counts.missing_relationship,
            orphaned_entity = report.counts.orphaned_entity,
            duplicate_relationship = report.counts.duplicate_relationship,
            multiple_parents = report.counts.multiple_parents,
            "audit finished"
        );
        Ok(report)
    }

    /// Pure comparison of an expected batch against a snapshot.
    pub fn compare(&self, expected: &GraphBatch, snapshot: &Snapshot) -> AuditReport {
        let mut discrepancies = Vec::new();
        let copies = snapshot.copies();

        // Missing entities, with the expected edges they block.
        for entity in &expected.entities {
            if snapshot.nodes.contains_key(&entity.id) {
                continue;
            }
            let blocked_relationships = expected
                .relationships
                .iter()
                .filter(|r| r.touches(&entity.id))
                .cloned()
                .collect();
            discrepancies.push(Discrepancy::MissingEntity {
                entity: entity.clone(),
                blocked_relationships,
            });
        }

        // Missing relationships between present endpoints.
        for relationship in &expected.relationships {
            let triple = &relationship.triple;
            let endpoints_present = snapshot.nodes.contains_key(&triple.source)
                && snapshot.nodes.contains_key(&triple.target);
            if endpoints_present && !copies.contains_key(triple) {
                discrepancies.push(Discrepancy::MissingRelationship {
                    relationship: relationship.clone(),
                });
            }
        }

        // Orphans.
        let expected_ids: BTreeSet<&EntityId> = expected.entities.iter().map(|e| &e.id).collect();
        let adopted: BTreeSet<&EntityId> = self
            .overrides
            .reattach
            .iter()
            .filter(|(orphan, target)| {
                let triple = Triple::new(target.parent.clone(), target.relation, (*orphan).clone());
                copies.contains_key(&triple)
            })
            .map(|(orphan, _)| orphan)
            .collect();
        let reachable = snapshot.reachable();

        for entity in snapshot.nodes.values() {
            let reason = if !expected_ids.contains(&entity.id) && !adopted.contains(&entity.id) {
                Some(OrphanReason::NotInCorpus)
            } else if checks_reachability(entity.kind) && !reachable.contains(&entity.id) {
                Some(OrphanReason::Unreachable)
            } else {
                None
            };
            if let Some(reason) = reason {
                debug!(entity = %entity.id, ?reason, "orphaned entity");
                discrepancies.push(Discrepancy::OrphanedEntity {
                    entity: entity.id.clone(),
                    kind: entity.kind,
                    reason,
                    reattach: self.overrides.reattach.get(&entity.id).cloned(),
                });
            }
        }

        // Duplicated edge copies.
        for (triple, n) in &copies {
            if *n > 1 {
                discrepancies.push(Discrepancy::DuplicateRelationship {
                    triple: (*triple).clone(),
                    copies: *n,
                });
            }
        }

        // Programs reachable through more than one Unit.
        for (program, parents) in snapshot.program_parents() {
            if parents.len() > 1 {
                debug!(program = %program, units = parents.len(), "program has several parents");
                discrepancies.push(Discrepancy::MultipleParents {
                    entity: program.clone(),
                    parents: parents.into_iter().cloned().collect(),
                });
            }
        }

        let mut counts = DiscrepancyCounts::default();
        for d in &discrepancies {
            match d {
                Discrepancy::MissingEntity { .. } => counts.missing_entity += 1,
                Discrepancy::MissingRelationship { .. } => counts.missing_relationship += 1,
                Discrepancy::OrphanedEntity { .. } => counts.orphaned_entity += 1,
                Discrepancy::DuplicateRelationship { .. } => counts.duplicate_relationship += 1,
                Discrepancy::MultipleParents { .. } => counts.multiple_parents += 1,
            }
        }

        AuditReport {
            audited_at: Utc::now(),
            expected_entities: expected.entities.len(),
            expected_relationships: expected.relationships.len(),
            actual_entities: snapshot.nodes.len(),
            actual_relationships: snapshot.edges.len(),
            counts,
            discrepancies,
        }
    }
}
