//! Skipped-record bookkeeping shared by every stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage that gave up on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Resolve,
    Upsert,
    Repair,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extract => "extract",
            Stage::Resolve => "resolve",
            Stage::Upsert => "upsert",
            Stage::Repair => "repair",
        })
    }
}

/// A record that was not written, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Source document, when the record came from one
    pub document: Option<String>,
    /// Entity id, relationship triple, or file name
    pub record: String,
    pub stage: Stage,
    pub reason: String,
}

impl SkippedRecord {
    pub fn new(
        stage: Stage,
        document: Option<&str>,
        record: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self {
            document: document.map(str::to_string),
            record: record.into(),
            stage,
            reason: reason.to_string(),
        }
    }
}
