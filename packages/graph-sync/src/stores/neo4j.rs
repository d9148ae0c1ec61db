//! Neo4j graph store.
//!
//! Every node carries the `:Entity` label plus its kind label
//! (`:Entity:Program`) and is merged on `id`. Arbitrary properties are kept as
//! one JSON string in `properties_json`; the well-known fields (`name`, `kind`,
//! `origin_document`) are plain node properties so Cypher consumers can query
//! them directly.

use async_trait::async_trait;
use neo4rs::{query, Graph, Query};

use crate::error::{GraphError, GraphResult};
use crate::stores::merge_node;
use crate::traits::store::{EdgePattern, GraphStore, NodePattern, StoredEdge, UpsertOutcome};
use crate::types::{Entity, EntityId, EntityKind, RelationKind, Relationship, Triple};

/// Neo4j-backed graph store.
pub struct Neo4jGraphStore {
    graph: Graph,
}

fn map_neo4j(e: neo4rs::Error) -> GraphError {
    GraphError::Backend(Box::new(e))
}

impl Neo4jGraphStore {
    /// Connect and create the id constraint.
    pub async fn connect(uri: &str, user: &str, password: &str) -> GraphResult<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;
        let store = Self { graph };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> GraphResult<()> {
        self.graph
            .run(query(
                "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (n:Entity) REQUIRE n.id IS UNIQUE",
            ))
            .await
            .map_err(map_neo4j)
    }

    async fn fetch_entities(&self, q: Query) -> GraphResult<Vec<Entity>> {
        let mut stream = self.graph.execute(q).await.map_err(map_neo4j)?;
        let mut entities = Vec::new();
        while let Some(row) = stream.next().await.map_err(map_neo4j)? {
            let id: String = row.get("id").map_err(|e| GraphError::decode(e.to_string()))?;
            let kind: String = row.get("kind").map_err(|e| GraphError::decode(e.to_string()))?;
            let kind = EntityKind::parse(&kind)
                .ok_or_else(|| GraphError::decode(format!("unknown node kind {kind:?}")))?;
            let properties: String = row.get("properties").unwrap_or_else(|_| "{}".to_string());
            entities.push(Entity {
                id: EntityId::from_raw(id),
                kind,
                name: row.get("name").unwrap_or_default(),
                origin_document: row.get("origin").unwrap_or_default(),
                properties: serde_json::from_str(&properties)?,
            });
        }
        Ok(entities)
    }
}

const NODE_RETURN: &str = "RETURN n.id AS id, n.kind AS kind, n.name AS name, \
     n.origin_document AS origin, n.properties_json AS properties";

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn ping(&self) -> GraphResult<()> {
        let mut stream = self
            .graph
            .execute(query("RETURN 1 AS ok"))
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?;
        while stream
            .next()
            .await
            .map_err(|e| GraphError::Unavailable(e.to_string()))?
            .is_some()
        {}
        Ok(())
    }

    async fn upsert_node(&self, entity: &Entity) -> GraphResult<UpsertOutcome> {
        let existing = self.get_node(&entity.id).await?;
        let (write, outcome) = merge_node(existing.as_ref(), entity);
        let Some(node) = write else {
            return Ok(outcome);
        };

        // Labels cannot be parameters; they come from a closed enum.
        let q = query(&format!(
            "MERGE (n:Entity {{id: $id}})
             SET n:{label},
                 n.kind = $kind,
                 n.name = $name,
                 n.origin_document = $origin,
                 n.properties_json = $properties",
            label = node.kind.label()
        ))
        .param("id", node.id.as_str())
        .param("kind", node.kind.as_str())
        .param("name", node.name.as_str())
        .param("origin", node.origin_document.as_str())
        .param("properties", serde_json::to_string(&node.properties)?);

        self.graph.run(q).await.map_err(map_neo4j)?;
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

        for id in [&triple.source, &triple.target] {
            if self.get_node(id).await?.is_none() {
                return Err(GraphError::MissingEndpoint { id: id.to_string() });
            }
        }

        let copies = self.match_edges(&EdgePattern::triple(triple)).await?;
        let outcome = match copies.first() {
            Some(edge) if edge.relationship.origin_document == relationship.origin_document => {
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        };

        let q = query(&format!(
            "MATCH (s:Entity {{id: $source}}), (t:Entity {{id: $target}})
             MERGE (s)-[r:{rel}]->(t)
             SET r.origin_document = $origin",
            rel = triple.kind.type_name()
        ))
        .param("source", triple.source.as_str())
        .param("target", triple.target.as_str())
        .param("origin", relationship.origin_document.as_str());

        self.graph.run(q).await.map_err(map_neo4j)?;
        Ok(outcome)
    }

    async fn get_node(&self, id: &EntityId) -> GraphResult<Option<Entity>> {
        let q = query(&format!("MATCH (n:Entity {{id: $id}}) {NODE_RETURN}")).param("id", id.as_str());
        Ok(self.fetch_entities(q).await?.into_iter().next())
    }

    async fn find_nodes(&self, pattern: &NodePattern) -> GraphResult<Vec<Entity>> {
        let q = match pattern.kind {
            Some(kind) => query(&format!(
                "MATCH (n:Entity {{kind: $kind}}) {NODE_RETURN} ORDER BY id"
            ))
            .param("kind", kind.as_str()),
            None => query(&format!("MATCH (n:Entity) {NODE_RETURN} ORDER BY id")),
        };
        self.fetch_entities(q).await
    }

    async fn match_edges(&self, pattern: &EdgePattern) -> GraphResult<Vec<StoredEdge>> {
        let rel = pattern
            .relation
            .map(|r| format!(":{}", r.type_name()))
            .unwrap_or_default();
        let mut filters = Vec::new();
        if pattern.source.is_some() {
            filters.push("s.id = $source");
        }
        if pattern.target.is_some() {
            filters.push("t.id = $target");
        }
        if pattern.source_kind.is_some() {
            filters.push("s.kind = $source_kind");
        }
        if pattern.target_kind.is_some() {
            filters.push("t.kind = $target_kind");
        }
        let where_clause = if filters.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", filters.join(" AND "))
        };

        let mut q = query(&format!(
            "MATCH (s:Entity)-[r{rel}]->(t:Entity) {where_clause}
             RETURN elementId(r) AS edge_id, s.id AS source, type(r) AS relation,
                    t.id AS target, r.origin_document AS origin
             ORDER BY edge_id"
        ));
        if let Some(source) = &pattern.source {
            q = q.param("source", source.as_str());
        }
        if let Some(target) = &pattern.target {
            q = q.param("target", target.as_str());
        }
        if let Some(kind) = pattern.source_kind {
            q = q.param("source_kind", kind.as_str());
        }
        if let Some(kind) = pattern.target_kind {
            q = q.param("target_kind", kind.as_str());
        }

        let mut stream = self.graph.execute(q).await.map_err(map_neo4j)?;
        let mut edges = Vec::new();
        while let Some(row) = stream.next().await.map_err(map_neo4j)? {
            let relation: String = row.get("relation").unwrap_or_default();
            // Edges written by other tools with unknown types are not ours.
            let Some(kind) = RelationKind::parse(&relation) else {
                continue;
            };
            let source: String = row.get("source").unwrap_or_default();
            let target: String = row.get("target").unwrap_or_default();
            edges.push(StoredEdge {
                edge_id: row.get("edge_id").unwrap_or_default(),
                relationship: Relationship::new(
                    EntityId::from_raw(source),
                    kind,
                    EntityId::from_raw(target),
                    row.get::<String>("origin").unwrap_or_default(),
                ),
            });
        }
        Ok(edges)
    }

    async fn collapse_edges(&self, triple: &Triple) -> GraphResult<usize> {
        let q = query(&format!(
            "MATCH (s:Entity {{id: $source}})-[r:{rel}]->(t:Entity {{id: $target}})
             WITH r ORDER BY elementId(r)
             WITH collect(r) AS copies
             UNWIND copies[1..] AS extra
             DELETE extra
             RETURN count(*) AS removed",
            rel = triple.kind.type_name()
        ))
        .param("source", triple.source.as_str())
        .param("target", triple.target.as_str());

        let mut stream = self.graph.execute(q).await.map_err(map_neo4j)?;
        let mut removed = 0;
        while let Some(row) = stream.next().await.map_err(map_neo4j)? {
            removed += row.get::<i64>("removed").unwrap_or(0) as usize;
        }
        Ok(removed)
    }
}
