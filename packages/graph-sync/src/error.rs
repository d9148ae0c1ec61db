//! Typed errors for the graph sync library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level errors for a sync run.
///
/// Only a handful of these abort a run: an unreachable store, an unreadable
/// corpus directory, or cancellation. Everything record-local is captured as a
/// [`SkippedRecord`](crate::types::report::SkippedRecord) instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Graph store operation failed
    #[error("graph store error: {0}")]
    Store(#[from] GraphError),

    /// A single document could not be extracted
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// Two records share an identifier but disagree on an identity field
    #[error(
        "identity collision on {id}: {field} is {existing:?} in {first_document} but {incoming:?} in {document}"
    )]
    IdentityCollision {
        id: String,
        field: String,
        existing: String,
        incoming: String,
        first_document: String,
        document: String,
    },

    /// Rules or override file could not be loaded
    #[error("invalid rules: {0}")]
    Rules(String),

    /// Corpus directory missing
    #[error("corpus directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    /// Filesystem error outside of per-document reads
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled between records
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by a [`GraphStore`](crate::traits::store::GraphStore).
#[derive(Debug, Error)]
pub enum GraphError {
    /// Store cannot be reached at all
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    /// Store call exceeded its time budget
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// Backend-specific failure (driver, SQL, Bolt)
    #[error("graph backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored data is malformed or the store is in a broken state; retrying
    /// will not help
    #[error("graph store data error: {0}")]
    Decode(String),

    /// Relationship kind does not connect these entity kinds
    #[error("invalid relationship {triple}: {reason}")]
    InvalidRelationship { triple: String, reason: String },

    /// Relationship endpoint is not in the graph
    #[error("relationship endpoint not found: {id}")]
    MissingEndpoint { id: String },

    /// Stored data could not be decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GraphError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphError::Unavailable(_) | GraphError::Timeout { .. } | GraphError::Backend(_)
        )
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        GraphError::Decode(message.into())
    }
}

/// Per-document extraction failures. Never abort the batch.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// File could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not UTF-8 text
    #[error("{document} is not valid UTF-8")]
    NotUtf8 { document: String },

    /// No entity rule matched anywhere in the document
    #[error("no extraction pattern matched in {document}")]
    NoPatterns { document: String },

    /// Extraction task panicked or was aborted
    #[error("extraction of {document} did not complete: {reason}")]
    Aborted { document: String, reason: String },
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type alias for graph store operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GraphError::Unavailable("down".into()).is_transient());
        assert!(GraphError::Timeout {
            operation: "upsert_node".into(),
            after: Duration::from_secs(1),
        }
        .is_transient());
        assert!(GraphError::Backend("connection reset".into()).is_transient());
        assert!(!GraphError::decode("unknown node kind \"Widget\"").is_transient());
        assert!(!GraphError::MissingEndpoint { id: "unit:x".into() }.is_transient());
        assert!(!GraphError::InvalidRelationship {
            triple: "a -[offers]-> b".into(),
            reason: "kinds".into(),
        }
        .is_transient());
    }
}
