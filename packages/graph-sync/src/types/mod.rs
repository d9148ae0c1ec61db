//! Core data types for the graph sync library.

pub mod config;
pub mod entity;
pub mod graph;
pub mod record;
pub mod relationship;
pub mod report;

pub use config::{OverrideTable, Reattachment, RetryConfig, RuleSet, SyncConfig};
pub use entity::{Entity, EntityId, EntityKind};
pub use graph::GraphBatch;
pub use record::{
    AccreditationRecord, CourseRecord, ExtractedRecord, OrganizationMetadata, PersonRecord,
    ProgramRecord, UnitRecord,
};
pub use relationship::{RelationKind, Relationship, Triple};
pub use report::{SkippedRecord, Stage};
