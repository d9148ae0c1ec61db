//! `GraphSync` - the main entry point tying the stages together.
//!
//! ```rust,ignore
//! let sync = GraphSync::new(store, SyncConfig::default())
//!     .with_overrides(OverrideTable::load(path)?);
//!
//! let extraction = sync.extract_corpus(Path::new("corpus")).await?;
//! let expected = sync.expected_graph(&extraction);
//! let load = sync.load(&extraction, &expected).await?;
//! let audit = sync.audit(&expected).await?;
//! let repair = sync.repair(&audit, &expected).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Result, SyncError};
use crate::identity::ResolutionTable;
use crate::pipeline::audit::{AuditReport, Auditor};
use crate::pipeline::build::{merge_batches, Builder};
use crate::pipeline::corpus::{discover, CorpusDocument};
use crate::pipeline::extract::Extractor;
use crate::pipeline::repair::{RepairExecutor, RepairReport};
use crate::pipeline::summary::CorpusSummary;
use crate::pipeline::upsert::{UpsertEngine, UpsertReport};
use crate::traits::store::GraphStore;
use crate::types::{
    ExtractedRecord, GraphBatch, OverrideTable, RuleSet, SkippedRecord, Stage, SyncConfig,
};

/// Extraction output for a whole corpus.
#[derive(Debug, Clone, Default)]
pub struct CorpusExtraction {
    /// One record per document, in file name order; failures included
    pub records: Vec<ExtractedRecord>,
    /// Graph batch per successful record, same order
    pub batches: Vec<GraphBatch>,
    pub skipped: Vec<SkippedRecord>,
    pub cancelled: bool,
}

impl CorpusExtraction {
    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.succeeded()
    }
}

/// The graph the corpus implies, after cross-document resolution.
#[derive(Debug, Clone, Default)]
pub struct ExpectedGraph {
    pub graph: GraphBatch,
    /// Identity collisions
    pub skipped: Vec<SkippedRecord>,
}

/// Result of loading the expected graph into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub documents_processed: usize,
    pub documents_failed: usize,
    pub expected_entities: usize,
    pub expected_relationships: usize,
    pub upsert: UpsertReport,
    /// Every record skipped by extraction, resolution or upsert
    pub skipped: Vec<SkippedRecord>,
    pub cancelled: bool,
}

/// One corpus, one store.
pub struct GraphSync<S> {
    engine: UpsertEngine<S>,
    config: SyncConfig,
    rules: Arc<RuleSet>,
    overrides: OverrideTable,
    cancel: CancellationToken,
}

impl<S: GraphStore> GraphSync<S> {
    pub fn new(store: S, config: SyncConfig) -> Self {
        Self {
            engine: UpsertEngine::new(store, &config),
            config,
            rules: Arc::new(RuleSet::default()),
            overrides: OverrideTable::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    /// Use an externally owned token (e.g. one cancelled on Ctrl-C).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    pub fn engine(&self) -> &UpsertEngine<S> {
        &self.engine
    }

    pub fn store(&self) -> &S {
        self.engine.store()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fail fast when the store cannot be reached at all.
    pub async fn check_store(&self) -> Result<()> {
        let store = self.engine.store();
        self.engine
            .policy()
            .run("ping", || store.ping())
            .await
            .map_err(|e| {
                error!(error = %e, "graph store unavailable");
                SyncError::Store(e)
            })
    }

    /// Extract and build every document in `dir`, `concurrency` at a time.
    ///
    /// A document that fails is kept as a failed record and does not stop
    /// the run. Output order is file name order regardless of completion
    /// order.
    pub async fn extract_corpus(&self, dir: &Path) -> Result<CorpusExtraction> {
        let documents = discover(dir, &self.overrides)?;
        info!(dir = %dir.display(), documents = documents.len(), "extracting corpus");

        let results: Vec<Option<(ExtractedRecord, Option<GraphBatch>)>> =
            stream::iter(documents)
                .map(|document| {
                    let rules = Arc::clone(&self.rules);
                    let placeholder = self.config.placeholder_unit_name.clone();
                    let cancel = self.cancel.clone();
                    async move {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let file_name = document.file_name.clone();
                        let organization = document.organization_name.clone();
                        let joined = tokio::task::spawn_blocking(move || {
                            process_document(&document, &rules, &placeholder)
                        })
                        .await;
                        Some(joined.unwrap_or_else(|e| {
                            (ExtractedRecord::failed(organization, file_name, e), None)
                        }))
                    }
                })
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await;

        let mut extraction = CorpusExtraction::default();
        for result in results {
            let Some((record, batch)) = result else {
                extraction.cancelled = true;
                continue;
            };
            match batch {
                Some(batch) => extraction.batches.push(batch),
                None => {
                    let reason = record.error.clone().unwrap_or_default();
                    extraction.skipped.push(SkippedRecord::new(
                        Stage::Extract,
                        Some(&record.source_file),
                        record.source_file.clone(),
                        reason,
                    ));
                }
            }
            extraction.records.push(record);
        }

        if extraction.cancelled {
            warn!(extracted = extraction.records.len(), "extraction cancelled");
        }
        info!(
            processed = extraction.records.len(),
            succeeded = extraction.succeeded(),
            failed = extraction.failed(),
            "corpus extracted"
        );
        Ok(extraction)
    }

    /// Merge per-document batches into one graph, in file name order so the
    /// first document to mention an entity owns its identity fields.
    pub fn expected_graph(&self, extraction: &CorpusExtraction) -> ExpectedGraph {
        let mut table = ResolutionTable::new();
        let (graph, skipped) = merge_batches(extraction.batches.iter().cloned(), &mut table);
        info!(
            entities = graph.entities.len(),
            relationships = graph.relationships.len(),
            collisions = skipped.len(),
            "expected graph built"
        );
        ExpectedGraph { graph, skipped }
    }

    /// Corpus-wide summary of an extraction.
    pub fn summarize(&self, extraction: &CorpusExtraction, expected: &ExpectedGraph) -> CorpusSummary {
        let mut skipped = extraction.skipped.clone();
        skipped.extend(expected.skipped.iter().cloned());
        CorpusSummary::new(
            &extraction.records,
            &extraction.batches,
            &expected.graph,
            &skipped,
        )
    }

    /// Upsert the expected graph.
    pub async fn load(
        &self,
        extraction: &CorpusExtraction,
        expected: &ExpectedGraph,
    ) -> Result<LoadReport> {
        self.check_store().await?;
        let started_at = Utc::now();

        let mut upsert = if extraction.cancelled {
            UpsertReport {
                cancelled: true,
                ..Default::default()
            }
        } else {
            self.engine.upsert(&expected.graph, &self.cancel).await
        };

        let mut skipped = extraction.skipped.clone();
        skipped.extend(expected.skipped.iter().cloned());
        skipped.append(&mut upsert.skipped);

        Ok(LoadReport {
            started_at,
            finished_at: Utc::now(),
            documents_processed: extraction.records.len(),
            documents_failed: extraction.failed(),
            expected_entities: expected.graph.entities.len(),
            expected_relationships: expected.graph.relationships.len(),
            cancelled: upsert.cancelled,
            upsert,
            skipped,
        })
    }

    /// Compare the store against the expected graph.
    pub async fn audit(&self, expected: &ExpectedGraph) -> Result<AuditReport> {
        self.check_store().await?;
        let report = Auditor::new(self.engine.store(), self.engine.policy(), &self.overrides)
            .audit(&expected.graph)
            .await?;
        Ok(report)
    }

    /// Apply an audit report, then re-audit.
    pub async fn repair(
        &self,
        report: &AuditReport,
        expected: &ExpectedGraph,
    ) -> Result<RepairReport> {
        self.check_store().await?;
        let repair = RepairExecutor::new(&self.engine, &self.overrides)
            .repair(report, &expected.graph, &self.cancel)
            .await?;
        Ok(repair)
    }
}

/// Read, extract and build one document. Returns the batch only on success.
fn process_document(
    document: &CorpusDocument,
    rules: &RuleSet,
    placeholder_unit_name: &str,
) -> (ExtractedRecord, Option<GraphBatch>) {
    let extracted = document.read().and_then(|text| {
        Extractor::new(&rules.extractor, &rules.classifier).extract(
            &document.organization_name,
            &document.file_name,
            &text,
        )
    });

    match extracted {
        Ok(record) => {
            let batch = Builder::new(&rules.classifier, placeholder_unit_name).build(&record);
            info!(
                document = %document.file_name,
                units = record.units.len(),
                programs = record.programs.len(),
                courses = record.courses.len(),
                people = record.people.len(),
                "document extracted"
            );
            (record, Some(batch))
        }
        Err(e) => {
            warn!(document = %document.file_name, error = %e, "document extraction failed");
            (
                ExtractedRecord::failed(&document.organization_name, &document.file_name, &e),
                None,
            )
        }
    }
}
