//! Sync pipeline - the core of the library.
//!
//! The pipeline runs:
//! - Corpus discovery (one document per organization)
//! - Pattern extraction into intermediate records
//! - Entity/relationship building and cross-document resolution
//! - Idempotent upsert into a graph store
//! - Consistency audit and repair

pub mod audit;
pub mod build;
pub mod corpus;
pub mod extract;
pub mod repair;
pub mod retry;
pub mod summary;
pub mod sync;
pub mod upsert;

pub use audit::{AuditReport, Auditor, Discrepancy, DiscrepancyCounts, OrphanReason, Snapshot};
pub use build::{course_level, merge_batches, Builder};
pub use corpus::{content_hash, discover, display_name_from_filename, CorpusDocument};
pub use extract::{canonical_body, Extractor, ExtractorRules, SectionKind, SectionRule};
pub use repair::{
    ActionStatus, RepairAction, RepairExecutor, RepairRecord, RepairReport, OVERRIDE_ORIGIN,
};
pub use retry::RetryPolicy;
pub use summary::{CorpusSummary, OrganizationRow, TopicAdoption};
pub use sync::{CorpusExtraction, ExpectedGraph, GraphSync, LoadReport};
pub use upsert::{KeyedLocks, UpsertEngine, UpsertReport};
