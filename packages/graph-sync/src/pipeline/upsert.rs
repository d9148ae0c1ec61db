//! Graph upsert engine.
//!
//! Entities are written in hierarchy order (one rank at a time) so parents
//! exist before the edges that point at them; relationships follow. Writes to
//! the same identifier are serialized by a keyed async lock, different
//! identifiers run concurrently up to `concurrency`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GraphError, GraphResult};
use crate::pipeline::retry::RetryPolicy;
use crate::traits::store::{GraphStore, UpsertOutcome};
use crate::types::{Entity, EntityId, GraphBatch, Relationship, SkippedRecord, Stage, SyncConfig};

/// Per-key async locks. An entry lives only while some task holds or waits
/// on its key.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyedGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(key.to_string()).or_default().clone()
        };
        KeyedGuard {
            locks: self,
            key: key.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one key of a [`KeyedLocks`].
pub struct KeyedGuard<'a> {
    locks: &'a KeyedLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold a clone of the Arc, so a count of one means only the
        // map still refers to it.
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}

/// Outcome counts of one upsert run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Per-kind counts of entities and relationships attempted
    pub attempted: BTreeMap<String, usize>,
    pub skipped: Vec<SkippedRecord>,
    /// Run stopped early by cancellation
    pub cancelled: bool,
}

impl UpsertReport {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    fn fail(&mut self, document: &str, record: String, error: &GraphError) {
        self.failed += 1;
        self.skipped
            .push(SkippedRecord::new(Stage::Upsert, Some(document), record, error));
    }

    /// Records that reached the store without error.
    pub fn written(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped.is_empty() && !self.cancelled
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: UpsertReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
        for (kind, n) in other.attempted {
            *self.attempted.entry(kind).or_insert(0) += n;
        }
        self.skipped.extend(other.skipped);
        self.cancelled |= other.cancelled;
    }
}

/// Idempotent writer in front of a [`GraphStore`].
pub struct UpsertEngine<S> {
    store: S,
    policy: RetryPolicy,
    concurrency: usize,
    locks: KeyedLocks,
}

impl<S: GraphStore> UpsertEngine<S> {
    pub fn new(store: S, config: &SyncConfig) -> Self {
        Self {
            store,
            policy: RetryPolicy::new(config.retry.clone(), config.store_timeout()),
            concurrency: config.concurrency.max(1),
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Merge one entity by identifier.
    pub async fn upsert_entity(&self, entity: &Entity) -> GraphResult<UpsertOutcome> {
        let _guard = self.locks.lock(entity.id.as_str()).await;
        self.policy
            .run("upsert_node", || self.store.upsert_node(entity))
            .await
    }

    /// Merge one relationship by triple.
    pub async fn upsert_relationship(
        &self,
        relationship: &Relationship,
    ) -> GraphResult<UpsertOutcome> {
        let _guard = self.locks.lock(&relationship.triple.to_string()).await;
        self.policy
            .run("upsert_edge", || self.store.upsert_edge(relationship))
            .await
    }

    /// Upsert a whole batch. Individual failures are recorded and skipped; a
    /// relationship whose endpoint failed is skipped without a store call.
    pub async fn upsert(&self, batch: &GraphBatch, cancel: &CancellationToken) -> UpsertReport {
        let mut report = UpsertReport::default();
        let mut failed: HashSet<EntityId> = HashSet::new();

        let mut ranks: BTreeMap<u8, Vec<&Entity>> = BTreeMap::new();
        for entity in &batch.entities {
            ranks.entry(entity.kind.rank()).or_default().push(entity);
            *report
                .attempted
                .entry(entity.kind.as_str().to_string())
                .or_insert(0) += 1;
        }

        for (rank, group) in ranks {
            debug!(rank, entities = group.len(), "upserting entity rank");
            let mut results: Vec<(&Entity, Option<GraphResult<UpsertOutcome>>)> =
                stream::iter(group)
                    .map(|entity| async move {
                        if cancel.is_cancelled() {
                            return (entity, None);
                        }
                        (entity, Some(self.upsert_entity(entity).await))
                    })
                    .buffer_unordered(self.concurrency)
                    .collect()
                    .await;
            results.sort_by(|a, b| a.0.id.cmp(&b.0.id));

            for (entity, result) in results {
                match result {
                    Some(Ok(outcome)) => report.record(outcome),
                    Some(Err(e)) => {
                        warn!(entity = %entity.id, error = %e, "entity upsert failed, skipping");
                        report.fail(&entity.origin_document, entity.id.to_string(), &e);
                        failed.insert(entity.id.clone());
                    }
                    None => report.cancelled = true,
                }
            }
            if report.cancelled {
                warn!("upsert cancelled");
                return report;
            }
        }

        let mut pending = Vec::new();
        for relationship in &batch.relationships {
            *report
                .attempted
                .entry(relationship.triple.kind.as_str().to_string())
                .or_insert(0) += 1;
            match [&relationship.triple.source, &relationship.triple.target]
                .into_iter()
                .find(|id| failed.contains(*id))
            {
                Some(id) => report.skipped.push(SkippedRecord::new(
                    Stage::Upsert,
                    Some(&relationship.origin_document),
                    relationship.triple.to_string(),
                    format!("endpoint {id} failed to upsert"),
                )),
                None => pending.push(relationship),
            }
        }

        let mut results: Vec<(&Relationship, Option<GraphResult<UpsertOutcome>>)> =
            stream::iter(pending)
                .map(|relationship| async move {
                    if cancel.is_cancelled() {
                        return (relationship, None);
                    }
                    (relationship, Some(self.upsert_relationship(relationship).await))
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by(|a, b| a.0.triple.cmp(&b.0.triple));

        for (relationship, result) in results {
            match result {
                Some(Ok(outcome)) => report.record(outcome),
                Some(Err(e)) => {
                    warn!(
                        relationship = %relationship.triple,
                        error = %e,
                        "relationship upsert failed, skipping"
                    );
                    report.fail(
                        &relationship.origin_document,
                        relationship.triple.to_string(),
                        &e,
                    );
                }
                None => report.cancelled = true,
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            "upsert finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryGraphStore;
    use crate::testing::FlakyStore;
    use crate::types::{EntityKind, RelationKind, RetryConfig};

    fn config() -> SyncConfig {
        SyncConfig::new().with_retry(RetryConfig::immediate(3))
    }

    fn batch() -> GraphBatch {
        let mut batch = GraphBatch::new();
        let org = batch.push_entity(Entity::new(EntityKind::Organization, "Test U", "t.md"));
        let unit = batch.push_entity(Entity::new(EntityKind::Unit, "Forestry Department", "t.md"));
        let program = batch.push_entity(Entity::new(EntityKind::Program, "BS Forestry", "t.md"));
        batch.push_relationship(Relationship::new(org, RelationKind::Locates, unit.clone(), "t.md"));
        batch.push_relationship(Relationship::new(unit, RelationKind::Offers, program, "t.md"));
        batch
    }

    #[tokio::test]
    async fn test_upsert_twice_is_idempotent() {
        let engine = UpsertEngine::new(MemoryGraphStore::new(), &config());
        let cancel = CancellationToken::new();

        let first = engine.upsert(&batch(), &cancel).await;
        assert_eq!(first.created, 5);
        assert!(first.is_success());

        let second = engine.upsert(&batch(), &cancel).await;
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, 5);
        assert_eq!(engine.store().node_count(), 3);
        assert_eq!(engine.store().edge_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = FlakyStore::new(MemoryGraphStore::new(), 2);
        let engine = UpsertEngine::new(store, &config());
        let report = engine.upsert(&batch(), &CancellationToken::new()).await;
        assert!(report.is_success());
        assert_eq!(report.created, 5);
    }

    #[tokio::test]
    async fn test_failed_entity_skips_its_edges() {
        let store = MemoryGraphStore::new();
        let engine = UpsertEngine::new(
            FlakyStore::failing_node(store, EntityId::new(EntityKind::Unit, "Forestry Department")),
            &config(),
        );
        let report = engine.upsert(&batch(), &CancellationToken::new()).await;

        assert_eq!(report.created, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(
            report
                .skipped
                .iter()
                .filter(|s| s.reason.contains("failed to upsert"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let engine = UpsertEngine::new(MemoryGraphStore::new(), &config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = engine.upsert(&batch(), &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.written(), 0);
        assert_eq!(engine.store().node_count(), 0);
    }

    #[tokio::test]
    async fn test_keyed_lock_serializes_same_key() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("unit:a").await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("unit:a").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        let _b = locks.lock("unit:b").await;
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_keyed_locks_release_entries() {
        let locks = KeyedLocks::new();
        {
            let _a = locks.lock("unit:a").await;
            let _b = locks.lock("program:b").await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());

        let engine = UpsertEngine::new(MemoryGraphStore::new(), &config());
        engine.upsert(&batch(), &CancellationToken::new()).await;
        assert!(engine.locks.is_empty());
    }
}
