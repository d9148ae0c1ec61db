//! Repair executor: applies an [`AuditReport`] to the store, then re-audits.
//!
//! Missing entities and relationships are written through the upsert engine,
//! duplicate edge copies are collapsed to one, and orphans are either
//! reattached from the override table or flagged for review, as are Programs
//! offered by more than one Unit. Entities are never deleted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GraphResult;
use crate::pipeline::audit::{AuditReport, Auditor, Discrepancy, DiscrepancyCounts, OrphanReason, Snapshot};
use crate::pipeline::upsert::UpsertEngine;
use crate::traits::store::{GraphStore, UpsertOutcome};
use crate::types::{
    Entity, EntityId, GraphBatch, OverrideTable, RelationKind, Relationship, Triple,
};

/// Provenance written on edges created from the override table.
pub const OVERRIDE_ORIGIN: &str = "overrides";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    CreatedEntity {
        entity: EntityId,
    },
    CreatedRelationship {
        triple: Triple,
    },
    CollapsedDuplicates {
        triple: Triple,
        removed: usize,
    },
    ReattachedOrphan {
        entity: EntityId,
        parent: EntityId,
        relation: RelationKind,
    },
    FlaggedForReview {
        entity: EntityId,
        reason: OrphanReason,
    },
    FlaggedMultipleParents {
        entity: EntityId,
        parents: Vec<EntityId>,
    },
}

impl RepairAction {
    pub fn name(&self) -> &'static str {
        match self {
            RepairAction::CreatedEntity { .. } => "created_entity",
            RepairAction::CreatedRelationship { .. } => "created_relationship",
            RepairAction::CollapsedDuplicates { .. } => "collapsed_duplicates",
            RepairAction::ReattachedOrphan { .. } => "reattached_orphan",
            RepairAction::FlaggedForReview { .. } => "flagged_for_review",
            RepairAction::FlaggedMultipleParents { .. } => "flagged_multiple_parents",
        }
    }

    pub fn target(&self) -> String {
        match self {
            RepairAction::CreatedEntity { entity }
            | RepairAction::ReattachedOrphan { entity, .. }
            | RepairAction::FlaggedForReview { entity, .. }
            | RepairAction::FlaggedMultipleParents { entity, .. } => entity.to_string(),
            RepairAction::CreatedRelationship { triple }
            | RepairAction::CollapsedDuplicates { triple, .. } => triple.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Applied,
    Flagged,
    Failed,
}

/// One action with the state it found and the state it left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairRecord {
    #[serde(flatten)]
    pub action: RepairAction,
    pub status: ActionStatus,
    pub before: String,
    pub after: String,
    pub error: Option<String>,
}

/// Everything the executor did, and the audit that followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Discrepancies found before repair
    pub found: DiscrepancyCounts,
    pub actions: Vec<RepairRecord>,
    /// Re-audit after all actions
    pub after: AuditReport,
    pub cancelled: bool,
}

impl RepairReport {
    pub fn count(&self, status: ActionStatus) -> usize {
        self.actions.iter().filter(|a| a.status == status).count()
    }
}

/// Applies discrepancy reports.
pub struct RepairExecutor<'a, S> {
    engine: &'a UpsertEngine<S>,
    overrides: &'a OverrideTable,
}

impl<'a, S: GraphStore> RepairExecutor<'a, S> {
    pub fn new(engine: &'a UpsertEngine<S>, overrides: &'a OverrideTable) -> Self {
        Self { engine, overrides }
    }

    /// Repair everything in `report`, then re-audit against `expected`.
    ///
    /// Fails only when the store cannot be read for the re-audit.
    pub async fn repair(
        &self,
        report: &AuditReport,
        expected: &GraphBatch,
        cancel: &CancellationToken,
    ) -> GraphResult<RepairReport> {
        let started_at = Utc::now();
        let mut actions = Vec::new();
        let cancelled = self.apply(report, &mut actions, cancel).await?;

        let after = Auditor::new(self.engine.store(), self.engine.policy(), self.overrides)
            .audit(expected)
            .await?;

        let repair = RepairReport {
            started_at,
            finished_at: Utc::now(),
            found: report.counts,
            actions,
            after,
            cancelled,
        };
        info!(
            applied = repair.count(ActionStatus::Applied),
            flagged = repair.count(ActionStatus::Flagged),
            failed = repair.count(ActionStatus::Failed),
            remaining = repair.after.counts.total(),
            "repair finished"
        );
        Ok(repair)
    }

    /// Returns whether the run was cancelled part way.
    async fn apply(
        &self,
        report: &AuditReport,
        actions: &mut Vec<RepairRecord>,
        cancel: &CancellationToken,
    ) -> GraphResult<bool> {
        // Entities first, parents before children.
        let mut missing: Vec<&Entity> = Vec::new();
        let mut relationships: Vec<&Relationship> = Vec::new();
        let mut queued: BTreeSet<&Triple> = BTreeSet::new();
        for discrepancy in &report.discrepancies {
            match discrepancy {
                Discrepancy::MissingEntity {
                    entity,
                    blocked_relationships,
                } => {
                    missing.push(entity);
                    for r in blocked_relationships {
                        if queued.insert(&r.triple) {
                            relationships.push(r);
                        }
                    }
                }
                Discrepancy::MissingRelationship { relationship } => {
                    if queued.insert(&relationship.triple) {
                        relationships.push(relationship);
                    }
                }
                _ => {}
            }
        }
        missing.sort_by_key(|e| e.kind.rank());

        for entity in missing {
            if cancel.is_cancelled() {
                return Ok(true);
            }
            let action = RepairAction::CreatedEntity {
                entity: entity.id.clone(),
            };
            let record = match self.engine.upsert_entity(entity).await {
                Ok(outcome) => applied(action, "absent", outcome_state(outcome)),
                Err(e) => failed(action, "absent", &e),
            };
            log_action(&record);
            actions.push(record);
        }

        for relationship in relationships {
            if cancel.is_cancelled() {
                return Ok(true);
            }
            let action = RepairAction::CreatedRelationship {
                triple: relationship.triple.clone(),
            };
            let record = match self.engine.upsert_relationship(relationship).await {
                Ok(outcome) => applied(action, "absent", outcome_state(outcome)),
                Err(e) => failed(action, "absent", &e),
            };
            log_action(&record);
            actions.push(record);
        }

        for discrepancy in &report.discrepancies {
            let Discrepancy::DuplicateRelationship { triple, copies } = discrepancy else {
                continue;
            };
            if cancel.is_cancelled() {
                return Ok(true);
            }
            let store = self.engine.store();
            let result = self
                .engine
                .policy()
                .run("collapse_edges", || store.collapse_edges(triple))
                .await;
            let before = format!("{copies} copies");
            let record = match result {
                Ok(removed) => applied(
                    RepairAction::CollapsedDuplicates {
                        triple: triple.clone(),
                        removed,
                    },
                    &before,
                    &format!("{} copies", copies.saturating_sub(removed)),
                ),
                Err(e) => failed(
                    RepairAction::CollapsedDuplicates {
                        triple: triple.clone(),
                        removed: 0,
                    },
                    &before,
                    &e,
                ),
            };
            log_action(&record);
            actions.push(record);
        }

        // Which Unit owns a Program is an operator decision.
        for discrepancy in &report.discrepancies {
            let Discrepancy::MultipleParents { entity, parents } = discrepancy else {
                continue;
            };
            if cancel.is_cancelled() {
                return Ok(true);
            }
            let names: Vec<String> = parents.iter().map(ToString::to_string).collect();
            let record = RepairRecord {
                action: RepairAction::FlaggedMultipleParents {
                    entity: entity.clone(),
                    parents: parents.clone(),
                },
                status: ActionStatus::Flagged,
                before: format!("offered by {}", names.join(", ")),
                after: "flagged for manual review".to_string(),
                error: None,
            };
            log_action(&record);
            actions.push(record);
        }

        // Orphans last: earlier repairs may already have reconnected them.
        let has_orphans = report
            .discrepancies
            .iter()
            .any(|d| matches!(d, Discrepancy::OrphanedEntity { .. }));
        if !has_orphans {
            return Ok(false);
        }
        let reachable = Snapshot::read(self.engine.store(), self.engine.policy())
            .await?
            .reachable();

        for discrepancy in &report.discrepancies {
            let Discrepancy::OrphanedEntity {
                entity,
                reason,
                reattach,
                ..
            } = discrepancy
            else {
                continue;
            };
            if cancel.is_cancelled() {
                return Ok(true);
            }
            let before = match reason {
                OrphanReason::NotInCorpus => "not in corpus",
                OrphanReason::Unreachable => "unreachable",
            };

            let record = match reattach {
                Some(target) => {
                    let relationship = Relationship::new(
                        target.parent.clone(),
                        target.relation,
                        entity.clone(),
                        OVERRIDE_ORIGIN,
                    );
                    let action = RepairAction::ReattachedOrphan {
                        entity: entity.clone(),
                        parent: target.parent.clone(),
                        relation: target.relation,
                    };
                    match self.engine.upsert_relationship(&relationship).await {
                        Ok(_) => applied(
                            action,
                            before,
                            &format!("attached to {} via {}", target.parent, target.relation),
                        ),
                        Err(e) => failed(action, before, &e),
                    }
                }
                None if *reason == OrphanReason::Unreachable && reachable.contains(entity) => {
                    debug!(entity = %entity, "orphan reconnected by earlier repairs");
                    continue;
                }
                None => RepairRecord {
                    action: RepairAction::FlaggedForReview {
                        entity: entity.clone(),
                        reason: *reason,
                    },
                    status: ActionStatus::Flagged,
                    before: before.to_string(),
                    after: "flagged for manual review".to_string(),
                    error: None,
                },
            };
            log_action(&record);
            actions.push(record);
        }

        Ok(false)
    }
}

fn outcome_state(outcome: UpsertOutcome) -> &'static str {
    match outcome {
        UpsertOutcome::Created => "created",
        UpsertOutcome::Updated => "updated",
        UpsertOutcome::Unchanged => "present",
    }
}

fn applied(action: RepairAction, before: &str, after: &str) -> RepairRecord {
    RepairRecord {
        action,
        status: ActionStatus::Applied,
        before: before.to_string(),
        after: after.to_string(),
        error: None,
    }
}

fn failed(action: RepairAction, before: &str, error: &dyn std::fmt::Display) -> RepairRecord {
    RepairRecord {
        action,
        status: ActionStatus::Failed,
        before: before.to_string(),
        after: before.to_string(),
        error: Some(error.to_string()),
    }
}

fn log_action(record: &RepairRecord) {
    match record.status {
        ActionStatus::Failed => warn!(
            action = record.action.name(),
            target = %record.action.target(),
            before = %record.before,
            error = record.error.as_deref().unwrap_or_default(),
            "repair action failed"
        ),
        _ => info!(
            action = record.action.name(),
            target = %record.action.target(),
            before = %record.before,
            after = %record.after,
            "repair action"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::stores::MemoryGraphStore;
    use crate::types::{EntityKind, RetryConfig, SyncConfig};

    fn expected() -> GraphBatch {
        let mut batch = GraphBatch::new();
        let org = batch.push_entity(Entity::new(EntityKind::Organization, "Test U", "t.md"));
        let unit = batch.push_entity(Entity::new(EntityKind::Unit, "Forestry Department", "t.md"));
        let program = batch.push_entity(Entity::new(EntityKind::Program, "BS Forestry", "t.md"));
        batch.push_relationship(Relationship::new(org, RelationKind::Locates, unit.clone(), "t.md"));
        batch.push_relationship(Relationship::new(unit, RelationKind::Offers, program, "t.md"));
        batch
    }

    async fn setup() -> (Arc<MemoryGraphStore>, UpsertEngine<Arc<MemoryGraphStore>>) {
        let store = Arc::new(MemoryGraphStore::new());
        let config = SyncConfig::new().with_retry(RetryConfig::immediate(1));
        let engine = UpsertEngine::new(store.clone(), &config);
        engine.upsert(&expected(), &CancellationToken::new()).await;
        (store, engine)
    }

    async fn audit(engine: &UpsertEngine<Arc<MemoryGraphStore>>, overrides: &OverrideTable) -> AuditReport {
        Auditor::new(engine.store(), engine.policy(), overrides)
            .audit(&expected())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_repair_closes_missing_and_duplicates() {
        let (store, engine) = setup().await;
        let batch = expected();
        store.remove_edges(&batch.relationships[1].triple).unwrap();
        store.insert_duplicate_edge(&batch.relationships[0]).unwrap();

        let overrides = OverrideTable::new();
        let before = audit(&engine, &overrides).await;
        assert_eq!(before.counts.missing_relationship, 1);
        assert_eq!(before.counts.duplicate_relationship, 1);

        let report = RepairExecutor::new(&engine, &overrides)
            .repair(&before, &batch, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.after.is_closed());
        assert!(report.after.is_clean(), "{:?}", report.after.discrepancies);
        assert_eq!(report.count(ActionStatus::Failed), 0);
        assert!(report.actions.iter().any(|a| matches!(
            a.action,
            RepairAction::CollapsedDuplicates { removed: 1, .. }
        )));
        // The program was only unreachable because its edge was missing.
        assert_eq!(report.count(ActionStatus::Flagged), 0);
        assert_eq!(store.node_count(), 3);
        assert_eq!(store.edge_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_entity_is_created_with_its_edges() {
        let (store, engine) = setup().await;
        let batch = expected();
        store.remove_node(&batch.entities[2].id).unwrap();

        let overrides = OverrideTable::new();
        let before = audit(&engine, &overrides).await;
        let report = RepairExecutor::new(&engine, &overrides)
            .repair(&before, &batch, &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = report.actions.iter().map(|a| a.action.name()).collect();
        assert_eq!(names, vec!["created_entity", "created_relationship"]);
        assert!(report.after.is_clean());
    }

    #[tokio::test]
    async fn test_orphans_are_flagged_or_reattached_never_deleted() {
        let (store, engine) = setup().await;
        let stray = Entity::new(EntityKind::Program, "GIS Certificate", "manual");
        let lost = Entity::new(EntityKind::Person, "Jane Smith", "manual");
        store.upsert_node(&stray).await.unwrap();
        store.upsert_node(&lost).await.unwrap();

        let overrides = OverrideTable::new().with_reattachment(
            stray.id.clone(),
            EntityId::new(EntityKind::Unit, "Forestry Department"),
            RelationKind::Offers,
        );
        let before = audit(&engine, &overrides).await;
        assert_eq!(before.counts.orphaned_entity, 2);

        let report = RepairExecutor::new(&engine, &overrides)
            .repair(&before, &expected(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.count(ActionStatus::Applied), 1);
        assert_eq!(report.count(ActionStatus::Flagged), 1);
        assert_eq!(store.node_count(), 5);
        assert_eq!(report.after.counts.orphaned_entity, 1);
        assert!(report.after.is_closed());
    }

    #[tokio::test]
    async fn test_edge_with_unfixable_endpoint_is_a_failed_action() {
        let (store, engine) = setup().await;
        let batch = expected();
        store.remove_node(&batch.entities[2].id).unwrap();
        let overrides = OverrideTable::new();
        let mut before = audit(&engine, &overrides).await;
        // Drop the entity action so its edge cannot be written.
        for d in &mut before.discrepancies {
            if let Discrepancy::MissingEntity {
                blocked_relationships,
                ..
            } = d
            {
                let blocked = std::mem::take(blocked_relationships);
                *d = Discrepancy::MissingRelationship {
                    relationship: blocked[0].clone(),
                };
            }
        }

        let report = RepairExecutor::new(&engine, &overrides)
            .repair(&before, &batch, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.count(ActionStatus::Failed), 1);
        assert_eq!(report.after.counts.missing_entity, 1);
    }

    #[tokio::test]
    async fn test_program_with_two_units_is_flagged() {
        let (store, engine) = setup().await;
        let batch = expected();
        let unit = Entity::new(EntityKind::Unit, "School of Natural Resources", "manual");
        store.upsert_node(&unit).await.unwrap();
        let org = batch.entities[0].id.clone();
        let program = batch.entities[2].id.clone();
        for relationship in [
            Relationship::new(org, RelationKind::Locates, unit.id.clone(), "manual"),
            Relationship::new(unit.id.clone(), RelationKind::Offers, program.clone(), "manual"),
        ] {
            store.upsert_edge(&relationship).await.unwrap();
        }

        let overrides = OverrideTable::new();
        let before = audit(&engine, &overrides).await;
        assert_eq!(before.counts.multiple_parents, 1);

        let report = RepairExecutor::new(&engine, &overrides)
            .repair(&before, &batch, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.count(ActionStatus::Flagged), 2);
        assert!(report.actions.iter().any(|a| a.action
            == RepairAction::FlaggedMultipleParents {
                entity: program.clone(),
                parents: vec![
                    EntityId::new(EntityKind::Unit, "Forestry Department"),
                    unit.id.clone(),
                ],
            }));
        assert_eq!(store.edge_count(), 4);
        assert_eq!(report.after.counts.multiple_parents, 1);
    }
}
