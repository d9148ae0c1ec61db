//! End-to-end tests for the corpus → graph → audit → repair loop.
//!
//! These tests verify:
//! 1. Cross-document resolution of shared units
//! 2. Placeholder units for unattached programs
//! 3. Idempotent upserts
//! 4. Audit discrepancies and repair closure

use std::path::Path;
use std::sync::Arc;

use graph_sync::identity::placeholder_unit_id;
use graph_sync::testing::fixtures;
use graph_sync::{
    EdgePattern, Entity, EntityId, EntityKind, ExpectedGraph, GraphStore, GraphSync,
    MemoryGraphStore, NodePattern, OverrideTable, RelationKind, Relationship, RetryConfig,
    SyncConfig, Triple, UpsertEngine, UpsertOutcome, PLACEHOLDER_UNIT,
};
use tempfile::TempDir;

type MemorySync = GraphSync<Arc<MemoryGraphStore>>;

fn new_sync() -> MemorySync {
    GraphSync::new(
        Arc::new(MemoryGraphStore::new()),
        SyncConfig::new()
            .with_concurrency(4)
            .with_retry(RetryConfig::immediate(2)),
    )
}

fn corpus() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fixtures::write_corpus(dir.path()).unwrap();
    dir
}

/// Extract, build and load a corpus directory.
async fn load(sync: &MemorySync, dir: &Path) -> ExpectedGraph {
    let extraction = sync.extract_corpus(dir).await.unwrap();
    let expected = sync.expected_graph(&extraction);
    let report = sync.load(&extraction, &expected).await.unwrap();
    assert_eq!(report.upsert.failed, 0, "{:?}", report.skipped);
    expected
}

fn unit(name: &str) -> EntityId {
    EntityId::new(EntityKind::Unit, name)
}

#[tokio::test]
async fn test_shared_unit_resolves_across_documents() {
    let dir = corpus();
    let sync = new_sync();
    load(&sync, dir.path()).await;

    let cs = unit("Computer Science Department");
    assert_eq!(cs, unit("computer science DEPARTMENT"));

    let units = sync
        .store()
        .find_nodes(&NodePattern::kind(EntityKind::Unit))
        .await
        .unwrap();
    assert_eq!(units.iter().filter(|u| u.id == cs).count(), 1);

    let locates = sync
        .store()
        .match_edges(&EdgePattern::relation(RelationKind::Locates).with_target(cs))
        .await
        .unwrap();
    let mut sources: Vec<_> = locates
        .iter()
        .map(|e| e.relationship.triple.source.to_string())
        .collect();
    sources.sort();
    assert_eq!(
        sources,
        vec![
            "organization:oregon-state-university",
            "organization:university-of-idaho"
        ]
    );
}

#[tokio::test]
async fn test_unattached_program_gets_placeholder_chain() {
    let dir = corpus();
    let sync = new_sync();
    load(&sync, dir.path()).await;

    let program = EntityId::new(EntityKind::Program, "Data Science (MS)");
    let placeholder = placeholder_unit_id(PLACEHOLDER_UNIT, "Oregon State University");
    let org = EntityId::new(EntityKind::Organization, "Oregon State University");

    let node = sync.store().get_node(&placeholder).await.unwrap().unwrap();
    assert_eq!(node.name, PLACEHOLDER_UNIT);

    let offers = Triple::new(placeholder.clone(), RelationKind::Offers, program);
    let locates = Triple::new(org, RelationKind::Locates, placeholder);
    for triple in [offers, locates] {
        assert_eq!(
            sync.store().count_edges(&EdgePattern::triple(&triple)).await.unwrap(),
            1,
            "{triple}"
        );
    }
}

#[tokio::test]
async fn test_same_triple_twice_is_one_edge() {
    let engine = UpsertEngine::new(MemoryGraphStore::new(), &SyncConfig::default());
    let org = Entity::new(EntityKind::Organization, "Test University", "t.md");
    let geo = Entity::new(EntityKind::Unit, "Geography Department", "t.md");
    engine.upsert_entity(&org).await.unwrap();
    engine.upsert_entity(&geo).await.unwrap();

    let edge = Relationship::new(org.id.clone(), RelationKind::Locates, geo.id.clone(), "t.md");
    assert_eq!(engine.upsert_relationship(&edge).await.unwrap(), UpsertOutcome::Created);
    assert_eq!(engine.upsert_relationship(&edge).await.unwrap(), UpsertOutcome::Unchanged);
    assert_eq!(engine.store().edge_count(), 1);
}

#[tokio::test]
async fn test_one_missing_edge_is_reported_and_repaired() {
    let dir = corpus();
    let sync = new_sync();
    let expected = load(&sync, dir.path()).await;

    let triple = Triple::new(
        EntityId::new(EntityKind::Program, "BS Forestry"),
        RelationKind::OffersCourse,
        EntityId::new(EntityKind::Course, "Introduction to Forestry"),
    );
    assert_eq!(sync.store().remove_edges(&triple).unwrap(), 1);

    let audit = sync.audit(&expected).await.unwrap();
    assert_eq!(audit.counts.missing_relationship, 1);
    assert_eq!(audit.counts.total(), 1);
    assert_eq!(audit.discrepancies[0].target(), triple.to_string());

    let repair = sync.repair(&audit, &expected).await.unwrap();
    assert_eq!(repair.after.counts.missing_relationship, 0);
    assert!(repair.after.is_clean());
}

#[tokio::test]
async fn test_reload_unchanged_corpus_writes_nothing_new() {
    let dir = corpus();
    let sync = new_sync();
    load(&sync, dir.path()).await;
    let nodes = sync.store().node_count();
    let edges = sync.store().edge_count();

    let extraction = sync.extract_corpus(dir.path()).await.unwrap();
    let expected = sync.expected_graph(&extraction);
    let second = sync.load(&extraction, &expected).await.unwrap();

    assert_eq!(second.upsert.created, 0);
    assert_eq!(second.upsert.updated, 0);
    assert_eq!(second.upsert.unchanged, nodes + edges);
    assert_eq!(sync.store().node_count(), nodes);
    assert_eq!(sync.store().edge_count(), edges);
}

#[tokio::test]
async fn test_every_program_reaches_an_organization() {
    let dir = corpus();
    let sync = new_sync();
    load(&sync, dir.path()).await;
    let store = sync.store();

    let programs = store
        .find_nodes(&NodePattern::kind(EntityKind::Program))
        .await
        .unwrap();
    assert!(!programs.is_empty());

    for program in programs {
        let offers = store
            .match_edges(
                &EdgePattern::relation(RelationKind::Offers)
                    .with_source_kind(EntityKind::Unit)
                    .with_target(program.id.clone()),
            )
            .await
            .unwrap();
        assert!(!offers.is_empty(), "{} has no unit", program.id);

        let mut reaches_org = false;
        for edge in offers {
            let locates = store
                .count_edges(
                    &EdgePattern::relation(RelationKind::Locates)
                        .with_source_kind(EntityKind::Organization)
                        .with_target(edge.relationship.triple.source.clone()),
                )
                .await
                .unwrap();
            reaches_org |= locates > 0;
        }
        assert!(reaches_org, "{} has no organization", program.id);
    }
}

#[tokio::test]
async fn test_repair_closes_a_damaged_graph() {
    let dir = corpus();
    let sync = new_sync();
    let expected = load(&sync, dir.path()).await;
    let store = sync.store();

    // Lose a person, duplicate an edge, add something the corpus never had.
    let jane = EntityId::new(EntityKind::Person, "Jane Smith");
    assert!(store.remove_node(&jane).unwrap());
    let locates = expected
        .graph
        .relationships
        .iter()
        .find(|r| r.triple.kind == RelationKind::Locates)
        .unwrap();
    store.insert_duplicate_edge(locates).unwrap();
    store
        .upsert_node(&Entity::new(EntityKind::Person, "Ghost Researcher", "legacy.md"))
        .await
        .unwrap();

    let audit = sync.audit(&expected).await.unwrap();
    assert_eq!(audit.counts.missing_entity, 1);
    assert_eq!(audit.counts.duplicate_relationship, 1);
    assert_eq!(audit.counts.orphaned_entity, 1);
    assert!(!audit.is_closed());

    let repair = sync.repair(&audit, &expected).await.unwrap();
    assert!(repair.after.is_closed());
    assert!(store.get_node(&jane).await.unwrap().is_some());
    // Flagged, never deleted.
    assert_eq!(repair.after.counts.orphaned_entity, 1);
    assert!(store
        .get_node(&EntityId::new(EntityKind::Person, "Ghost Researcher"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_override_reattaches_orphan() {
    let dir = corpus();
    let ghost = EntityId::new(EntityKind::Person, "Ghost Researcher");
    let overrides = OverrideTable::new().with_reattachment(
        ghost.clone(),
        unit("Spatial Ecology Lab"),
        RelationKind::Employs,
    );
    let sync = new_sync().with_overrides(overrides);
    let expected = load(&sync, dir.path()).await;
    sync.store()
        .upsert_node(&Entity::new(EntityKind::Person, "Ghost Researcher", "legacy.md"))
        .await
        .unwrap();

    let audit = sync.audit(&expected).await.unwrap();
    assert_eq!(audit.counts.orphaned_entity, 1);

    let repair = sync.repair(&audit, &expected).await.unwrap();
    assert!(repair.after.is_clean(), "{:?}", repair.after.discrepancies);
    let employs = Triple::new(unit("Spatial Ecology Lab"), RelationKind::Employs, ghost);
    assert_eq!(
        sync.store().count_edges(&EdgePattern::triple(&employs)).await.unwrap(),
        1
    );
}

fn write_docs(docs: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in docs {
        std::fs::write(dir.path().join(name), body).unwrap();
    }
    dir
}

#[tokio::test]
async fn test_program_listed_under_two_units_is_reported() {
    let dir = write_docs(&[
        (
            "Alpha_University.md",
            "# Alpha University\n\n## Academic Departments\n\n- Department of Forestry\n  - BS Forestry\n",
        ),
        (
            "Beta_College.md",
            "# Beta College\n\n## Academic Departments\n\n- School of Natural Resources\n  - BS Forestry\n",
        ),
    ]);
    let sync = new_sync();
    let expected = load(&sync, dir.path()).await;

    let audit = sync.audit(&expected).await.unwrap();
    assert_eq!(audit.counts.multiple_parents, 1, "{:?}", audit.discrepancies);
    let flagged = audit.of_kind("multiple_parents").next().unwrap();
    assert_eq!(flagged.target(), "program:bs-forestry");

    let repair = sync.repair(&audit, &expected).await.unwrap();
    assert!(repair.after.is_closed());
    assert_eq!(repair.after.counts.multiple_parents, 1);
}

#[tokio::test]
async fn test_colliding_organization_leaves_no_orphans() {
    let dir = write_docs(&[
        (
            "State_University.md",
            "# State University\n\n## Overview\n\nLocation: Corvallis, Oregon\n\n## Academic Departments\n\n- Department of Forestry\n  - BS Forestry\n",
        ),
        (
            "State_University.txt",
            "# State University\n\n## Overview\n\nLocation: Logan, Utah\n\n## Academic Departments\n\n- Department of Wildland Resources\n  - BS Rangeland Ecology\n",
        ),
    ]);
    let sync = new_sync();
    let extraction = sync.extract_corpus(dir.path()).await.unwrap();
    let expected = sync.expected_graph(&extraction);
    assert!(!expected.skipped.is_empty());
    assert!(expected
        .skipped
        .iter()
        .all(|s| s.document.as_deref() == Some("State_University.txt")));
    sync.load(&extraction, &expected).await.unwrap();

    let rangeland = EntityId::new(EntityKind::Program, "BS Rangeland Ecology");
    assert!(sync.store().get_node(&rangeland).await.unwrap().is_none());

    let audit = sync.audit(&expected).await.unwrap();
    assert!(audit.is_clean(), "{:?}", audit.discrepancies);
}
