//! Organization Profile Graph Sync Library
//!
//! Turns a directory of organization profile documents (one Markdown or text
//! file per organization) into a typed property graph, keeps that graph
//! consistent with the corpus, and repairs it when it drifts.
//!
//! # Design Philosophy
//!
//! - Pattern rules, not language understanding
//! - Deterministic identifiers from normalized names
//! - Every write is an idempotent merge
//! - Per-record failures are recorded, never fatal
//!
//! # Usage
//!
//! ```rust,ignore
//! use graph_sync::{GraphSync, MemoryGraphStore, SyncConfig};
//!
//! let sync = GraphSync::new(MemoryGraphStore::new(), SyncConfig::default());
//!
//! let extraction = sync.extract_corpus(Path::new("profiles")).await?;
//! let expected = sync.expected_graph(&extraction);
//! sync.load(&extraction, &expected).await?;
//!
//! let audit = sync.audit(&expected).await?;
//! if !audit.is_clean() {
//!     let repair = sync.repair(&audit, &expected).await?;
//!     assert!(repair.after.is_closed());
//! }
//! ```
//!
//! # Modules
//!
//! - [`classify`] - Ordered keyword rule tables for labels
//! - [`identity`] - Name normalization and cross-document resolution
//! - [`pipeline`] - Extract, build, upsert, audit and repair stages
//! - [`stores`] - Graph store implementations (memory, SQLite, Neo4j)
//! - [`traits`] - The `GraphStore` abstraction
//! - [`types`] - Entities, relationships, records and config
//! - [`output`] - JSON and Markdown batch outputs
//! - [`testing`] - Test doubles and fixture documents

pub mod classify;
pub mod error;
pub mod identity;
pub mod output;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{DocumentError, GraphError, GraphResult, Result, SyncError};
pub use classify::{
    Category, Classifier, KeywordRule, Label, ProgramLevel, ProgramType, RuleTable,
    TechnologyFocus, UnitFocus,
};
pub use identity::{normalize, slug, ResolutionTable, PLACEHOLDER_UNIT};
pub use traits::store::{EdgePattern, GraphStore, NodePattern, StoredEdge, UpsertOutcome};
pub use types::{
    Entity, EntityId, EntityKind, ExtractedRecord, GraphBatch, OverrideTable, Reattachment,
    RelationKind, Relationship, RetryConfig, RuleSet, SkippedRecord, Stage, SyncConfig, Triple,
};

// Re-export pipeline components
pub use pipeline::{
    // Orchestration
    CorpusExtraction, ExpectedGraph, GraphSync, LoadReport,
    // Stages
    Auditor, Builder, Extractor, ExtractorRules, RepairExecutor, RetryPolicy, UpsertEngine,
    // Reports
    ActionStatus, AuditReport, CorpusSummary, Discrepancy, DiscrepancyCounts, OrphanReason,
    RepairAction, RepairReport, UpsertReport,
};

pub use output::OutputWriter;

// Re-export stores
pub use stores::MemoryGraphStore;

#[cfg(feature = "sqlite")]
pub use stores::SqliteGraphStore;

#[cfg(feature = "neo4j")]
pub use stores::Neo4jGraphStore;
