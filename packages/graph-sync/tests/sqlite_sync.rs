//! Full sync against the SQLite store.

#![cfg(feature = "sqlite")]

use graph_sync::testing::fixtures;
use graph_sync::{EdgePattern, GraphStore, GraphSync, NodePattern, SqliteGraphStore, SyncConfig};

#[tokio::test]
async fn test_sqlite_load_audit_reload() {
    let dir = tempfile::tempdir().unwrap();
    fixtures::write_corpus(dir.path()).unwrap();

    let store = SqliteGraphStore::in_memory().await.unwrap();
    let sync = GraphSync::new(store, SyncConfig::new().with_concurrency(2));

    let extraction = sync.extract_corpus(dir.path()).await.unwrap();
    let expected = sync.expected_graph(&extraction);
    let first = sync.load(&extraction, &expected).await.unwrap();
    assert_eq!(first.upsert.failed, 0);

    let audit = sync.audit(&expected).await.unwrap();
    assert!(audit.is_clean(), "{:?}", audit.discrepancies);

    let second = sync.load(&extraction, &expected).await.unwrap();
    assert_eq!(second.upsert.created, 0);
    assert_eq!(
        sync.store().count_nodes(&NodePattern::all()).await.unwrap(),
        expected.graph.entities.len()
    );
    assert_eq!(
        sync.store().count_edges(&EdgePattern::all()).await.unwrap(),
        expected.graph.relationships.len()
    );
}
