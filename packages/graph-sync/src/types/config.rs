//! Configuration types for sync runs, rules and overrides.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::Classifier;
use crate::error::{Result, SyncError};
use crate::identity::PLACEHOLDER_UNIT;
use crate::pipeline::extract::ExtractorRules;
use crate::types::entity::EntityId;
use crate::types::relationship::RelationKind;

/// Configuration for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Documents extracted, and records upserted, concurrently.
    ///
    /// Default: 8.
    pub concurrency: usize,

    /// Time budget for a single store call, in seconds.
    ///
    /// Default: 30.
    pub store_timeout_secs: u64,

    /// Retry policy for transient store failures.
    pub retry: RetryConfig,

    /// Display name of the synthesized unit for unattached programs and people.
    pub placeholder_unit_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            store_timeout_secs: 30,
            retry: RetryConfig::default(),
            placeholder_unit_name: PLACEHOLDER_UNIT.to_string(),
        }
    }
}

impl SyncConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set concurrency (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the per-call store timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the placeholder unit name.
    pub fn with_placeholder_unit_name(mut self, name: impl Into<String>) -> Self {
        self.placeholder_unit_name = name.into();
        self
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first. Default: 3.
    pub max_attempts: u32,

    /// Delay before the first retry. Default: 200ms.
    pub base_delay_ms: u64,

    /// Upper bound for any single delay. Default: 5s.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// No waiting between attempts (tests).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Extraction and classification rules, loadable from one JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub classifier: Classifier,
    pub extractor: ExtractorRules,
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Rules(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Where to reattach an orphaned entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reattachment {
    pub parent: EntityId,
    pub relation: RelationKind,
}

/// Operator-maintained overrides.
///
/// ```json
/// {
///   "organization_names": {"Univ_of_Idaho.md": "University of Idaho"},
///   "reattach": {"program:gis-certificate": {"parent": "unit:geography", "relation": "offers"}}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverrideTable {
    /// File name (or stem) → organization display name
    pub organization_names: BTreeMap<String, String>,
    /// Orphan id → parent and relation to attach it with
    pub reattach: BTreeMap<EntityId, Reattachment>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let table: Self =
            serde_json::from_str(json).map_err(|e| SyncError::Rules(e.to_string()))?;
        for (orphan, target) in &table.reattach {
            let triple = crate::types::relationship::Triple::new(
                target.parent.clone(),
                target.relation,
                orphan.clone(),
            );
            triple
                .validate()
                .map_err(|reason| SyncError::Rules(format!("reattach {orphan}: {reason}")))?;
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn with_organization_name(
        mut self,
        file: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.organization_names.insert(file.into(), name.into());
        self
    }

    pub fn with_reattachment(
        mut self,
        orphan: EntityId,
        parent: EntityId,
        relation: RelationKind,
    ) -> Self {
        self.reattach.insert(orphan, Reattachment { parent, relation });
        self
    }

    /// Override for a file, matched by full file name first, then stem.
    pub fn organization_name(&self, file_name: &str, stem: &str) -> Option<&str> {
        self.organization_names
            .get(file_name)
            .or_else(|| self.organization_names.get(stem))
            .map(String::as_str)
    }
}
