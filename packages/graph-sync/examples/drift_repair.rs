//! Drift Repair - Reference Walkthrough
//!
//! Loads the sample profiles into an in-memory graph, damages the graph the
//! way a second writer might, then audits and repairs it.
//!
//! ```bash
//! cargo run --example drift_repair
//! ```

use std::sync::Arc;

use graph_sync::testing::fixtures;
use graph_sync::{
    EntityId, EntityKind, GraphSync, MemoryGraphStore, OutputWriter, RelationKind, SyncConfig,
    Triple,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let corpus = tempfile::tempdir()?;
    fixtures::write_corpus(corpus.path())?;

    let store = Arc::new(MemoryGraphStore::new());
    let sync = GraphSync::new(store.clone(), SyncConfig::default());

    let extraction = sync.extract_corpus(corpus.path()).await?;
    let expected = sync.expected_graph(&extraction);
    sync.load(&extraction, &expected).await?;
    println!("loaded {} nodes and {} edges", store.node_count(), store.edge_count());

    // Drop an edge and a person behind the pipeline's back.
    store.remove_edges(&Triple::new(
        EntityId::new(EntityKind::Unit, "Department of Forest Engineering"),
        RelationKind::Offers,
        EntityId::new(EntityKind::Program, "BS Forestry"),
    ))?;
    store.remove_node(&EntityId::new(EntityKind::Person, "Alan Turing"))?;

    let audit = sync.audit(&expected).await?;
    for discrepancy in &audit.discrepancies {
        println!("found {:<22} {}", discrepancy.kind(), discrepancy.target());
    }

    let repair = sync.repair(&audit, &expected).await?;
    for record in &repair.actions {
        println!("{:?} {:<20} {}", record.status, record.action.name(), record.action.target());
    }

    let out = tempfile::tempdir()?;
    let (_, summary) = OutputWriter::new(out.path()).write_repair_report(&repair)?;
    println!("\n{}", std::fs::read_to_string(summary)?);
    Ok(())
}
