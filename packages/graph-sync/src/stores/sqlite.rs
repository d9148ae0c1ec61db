//! SQLite graph store.
//!
//! Nodes and edges live in two tables. Edges have no uniqueness constraint on
//! `(source, relation, target)`: merging happens in [`GraphStore::upsert_edge`]
//! and duplicates left by other writers stay visible to the auditor.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use crate::error::{GraphError, GraphResult};
use crate::stores::merge_node;
use crate::traits::store::{EdgePattern, GraphStore, NodePattern, StoredEdge, UpsertOutcome};
use crate::types::{Entity, EntityId, EntityKind, RelationKind, Relationship, Triple};

/// SQLite-based graph store.
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

fn map_sqlx(e: sqlx::Error) -> GraphError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            GraphError::Unavailable(e.to_string())
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => GraphError::Decode(e.to_string()),
        other => GraphError::Backend(Box::new(other)),
    }
}

impl SqliteGraphStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./graph.db?mode=rwc` - File-based, create if missing
    pub async fn new(database_url: &str) -> GraphResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> GraphResult<Self> {
        // One connection: every pooled connection would get its own memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> GraphResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                origin_document TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS edges (
                edge_id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                relation TEXT NOT NULL,
                target TEXT NOT NULL,
                origin_document TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_edges_triple ON edges(source, relation, target);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Row types for sqlx queries
#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    kind: String,
    name: String,
    origin_document: String,
    properties: String,
}

impl NodeRow {
    fn into_entity(self) -> GraphResult<Entity> {
        let kind = EntityKind::parse(&self.kind)
            .ok_or_else(|| GraphError::decode(format!("unknown node kind {:?}", self.kind)))?;
        Ok(Entity {
            id: EntityId::from_raw(self.id),
            kind,
            name: self.name,
            origin_document: self.origin_document,
            properties: serde_json::from_str(&self.properties)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    edge_id: i64,
    source: String,
    relation: String,
    target: String,
    origin_document: String,
}

impl EdgeRow {
    fn into_stored_edge(self) -> GraphResult<StoredEdge> {
        let kind = RelationKind::parse(&self.relation).ok_or_else(|| {
            GraphError::decode(format!("unknown relation {:?}", self.relation))
        })?;
        Ok(StoredEdge {
            edge_id: self.edge_id.to_string(),
            relationship: Relationship::new(
                EntityId::from_raw(self.source),
                kind,
                EntityId::from_raw(self.target),
                self.origin_document,
            ),
        })
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn ping(&self) -> GraphResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn upsert_node(&self, entity: &Entity) -> GraphResult<UpsertOutcome> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let existing: Option<NodeRow> = sqlx::query_as(
            "SELECT id, kind, name, origin_document, properties FROM nodes WHERE id = ?",
        )
        .bind(entity.id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let existing = existing.map(NodeRow::into_entity).transpose()?;

        let (write, outcome) = merge_node(existing.as_ref(), entity);
        if let Some(node) = write {
            let properties = serde_json::to_string(&node.properties)?;
            sqlx::query(
                r#"
                INSERT INTO nodes (id, kind, name, origin_document, properties)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    name = excluded.name,
                    origin_document = excluded.origin_document,
                    properties = excluded.properties
                "#,
            )
            .bind(node.id.as_str())
            .bind(node.kind.as_str())
            .bind(&node.name)
            .bind(&node.origin_document)
            .bind(properties)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(outcome)
    }

    async fn upsert_edge(&self, relationship: &Relationship) -> GraphResult<UpsertOutcome> {
        let triple = &relationship.triple;
        triple
            .validate()
            .map_err(|reason| GraphError::InvalidRelationship {
                triple: triple.to_string(),
                reason,
            })?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        for id in [&triple.source, &triple.target] {
            let found: Option<(String,)> = sqlx::query_as("SELECT id FROM nodes WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            if found.is_none() {
                return Err(GraphError::MissingEndpoint { id: id.to_string() });
            }
        }

        let existing: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT edge_id, origin_document FROM edges
            WHERE source = ? AND relation = ? AND target = ?
            ORDER BY edge_id
            LIMIT 1
            "#,
        )
        .bind(triple.source.as_str())
        .bind(triple.kind.as_str())
        .bind(triple.target.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let outcome = match existing {
            Some((_, origin)) if origin == relationship.origin_document => UpsertOutcome::Unchanged,
            Some((edge_id, _)) => {
                sqlx::query("UPDATE edges SET origin_document = ? WHERE edge_id = ?")
                    .bind(&relationship.origin_document)
                    .bind(edge_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;
                UpsertOutcome::Updated
            }
            None => {
                sqlx::query(
                    "INSERT INTO edges (source, relation, target, origin_document) VALUES (?, ?, ?, ?)",
                )
                .bind(triple.source.as_str())
                .bind(triple.kind.as_str())
                .bind(triple.target.as_str())
                .bind(&relationship.origin_document)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
                UpsertOutcome::Created
            }
        };

        tx.commit().await.map_err(map_sqlx)?;
        Ok(outcome)
    }

    async fn get_node(&self, id: &EntityId) -> GraphResult<Option<Entity>> {
        let row: Option<NodeRow> = sqlx::query_as(
            "SELECT id, kind, name, origin_document, properties FROM nodes WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        row.map(NodeRow::into_entity).transpose()
    }

    async fn find_nodes(&self, pattern: &NodePattern) -> GraphResult<Vec<Entity>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, kind, name, origin_document, properties FROM nodes
            WHERE (?1 IS NULL OR kind = ?1)
            ORDER BY id
            "#,
        )
        .bind(pattern.kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.into_iter().map(NodeRow::into_entity).collect()
    }

    async fn match_edges(&self, pattern: &EdgePattern) -> GraphResult<Vec<StoredEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            SELECT edge_id, source, relation, target, origin_document FROM edges
            WHERE (?1 IS NULL OR relation = ?1)
              AND (?2 IS NULL OR source = ?2)
              AND (?3 IS NULL OR target = ?3)
            ORDER BY edge_id
            "#,
        )
        .bind(pattern.relation.map(|r| r.as_str()))
        .bind(pattern.source.as_ref().map(|s| s.as_str().to_string()))
        .bind(pattern.target.as_ref().map(|t| t.as_str().to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let edge = row.into_stored_edge()?;
            // Endpoint kinds are encoded in the id prefix.
            if pattern.matches(&edge.relationship.triple) {
                edges.push(edge);
            }
        }
        Ok(edges)
    }

    async fn collapse_edges(&self, triple: &Triple) -> GraphResult<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM edges
            WHERE source = ?1 AND relation = ?2 AND target = ?3
              AND edge_id > (
                SELECT MIN(edge_id) FROM edges
                WHERE source = ?1 AND relation = ?2 AND target = ?3
              )
            "#,
        )
        .bind(triple.source.as_str())
        .bind(triple.kind.as_str())
        .bind(triple.target.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() as usize)
    }
}
