//! Neo4j client for the maintenance jobs

use super::error::StoreError;
use super::models::*;
use super::traits::{GraphStore, GraphTxn};
use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    Graph, Query, Row, Txn,
};
use serde_json::Value;
use std::sync::Arc;

/// Name of the HNSW index over `Concept.embedding`.
pub const CONCEPT_VECTOR_INDEX: &str = "concept_embeddings";

/// Client for Neo4j operations
#[derive(Clone)]
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

impl Neo4jClient {
    /// Create a new Neo4j client and make sure the schema exists.
    pub async fn new(
        uri: &str,
        user: &str,
        password: &str,
        embedding_dimensions: usize,
    ) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        client.init_schema(embedding_dimensions).await?;

        Ok(client)
    }

    /// Initialize constraints and indexes used by the maintenance queries
    async fn init_schema(&self, embedding_dimensions: usize) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT concept_id IF NOT EXISTS FOR (c:Concept) REQUIRE c.id IS UNIQUE"
                .to_string(),
            "CREATE CONSTRAINT chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.id IS UNIQUE"
                .to_string(),
            "CREATE INDEX concept_course_ids IF NOT EXISTS FOR (c:Concept) ON (c.course_ids)"
                .to_string(),
            "CREATE INDEX concept_note_ids IF NOT EXISTS FOR (c:Concept) ON (c.note_ids)"
                .to_string(),
        ];

        for statement in statements {
            if let Err(e) = self.graph.run(query(&statement)).await {
                tracing::warn!("Constraint or index may already exist: {}", e);
            }
        }

        // Vector indexes need Neo4j 5.13+; similarity search is unavailable without one
        let vector_index = format!(
            r#"CREATE VECTOR INDEX {CONCEPT_VECTOR_INDEX} IF NOT EXISTS
               FOR (c:Concept) ON (c.embedding)
               OPTIONS {{indexConfig: {{
                   `vector.dimensions`: {embedding_dimensions},
                   `vector.similarity_function`: 'cosine'
               }}}}"#
        );
        if let Err(e) = self.graph.run(query(&vector_index)).await {
            tracing::warn!(
                "Vector index creation skipped (Neo4j may not support vector indexes): {}",
                e
            );
        }

        Ok(())
    }

    /// Round-trip a trivial query to check connectivity.
    pub async fn ping(&self) -> Result<()> {
        let mut result = self
            .graph
            .execute(query("RETURN 1 AS ok"))
            .await
            .context("Neo4j ping failed")?;
        while result.next().await?.is_some() {}
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jClient {
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, StoreError> {
        let txn = self.graph.start_txn().await?;
        Ok(Box::new(Neo4jTxn { txn }))
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// A write transaction on Neo4j.
pub struct Neo4jTxn {
    txn: Txn,
}

impl Neo4jTxn {
    async fn fetch(&mut self, q: Query) -> Result<Vec<Row>, StoreError> {
        let mut stream = self.txn.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_count(&mut self, q: Query) -> Result<usize, StoreError> {
        let rows = self.fetch(q).await?;
        let n = match rows.first() {
            Some(row) => row.get::<i64>("n")?,
            None => 0,
        };
        Ok(n.max(0) as usize)
    }
}

#[async_trait]
impl GraphTxn for Neo4jTxn {
    async fn concepts_with_embeddings(
        &mut self,
        scope: &Scope,
    ) -> Result<Vec<ConceptRecord>, StoreError> {
        let key = scope.scope_type.membership_key();
        let q = query(&format!(
            r#"
            MATCH (c:Concept)
            WHERE $scope_id IN c.`{key}` AND c.embedding IS NOT NULL
            RETURN c.id AS id, labels(c) AS labels, c.embedding AS embedding
            ORDER BY c.id
            "#
        ))
        .param("scope_id", scope.id.clone());

        let mut concepts = Vec::new();
        for row in self.fetch(q).await? {
            let mut labels: Vec<String> = row.get("labels")?;
            labels.sort();
            let embedding: Vec<f64> = row.get("embedding")?;
            concepts.push(ConceptRecord {
                id: row.get("id")?,
                labels,
                embedding: embedding.into_iter().map(|x| x as f32).collect(),
            });
        }
        Ok(concepts)
    }

    // Exact search over the scope's concepts, so other tenants never use up the top-k
    async fn nearest_concepts(
        &mut self,
        concept: &ConceptRecord,
        k: usize,
        scope: &Scope,
    ) -> Result<Vec<SimilarConcept>, StoreError> {
        let key = scope.scope_type.membership_key();
        let q = query(&format!(
            r#"
            MATCH (node:Concept)
            WHERE $scope_id IN node.`{key}`
              AND node.id <> $id
              AND node.embedding IS NOT NULL
              AND size(node.embedding) = size($embedding)
              AND size(labels(node)) = size($labels)
              AND all(l IN labels(node) WHERE l IN $labels)
            WITH node, vector.similarity.cosine(node.embedding, $embedding) AS score
            RETURN node.id AS id, score
            ORDER BY score DESC, id
            LIMIT $k
            "#
        ))
        .param(
            "embedding",
            concept
                .embedding
                .iter()
                .map(|x| *x as f64)
                .collect::<Vec<f64>>(),
        )
        .param("id", concept.id.clone())
        .param("scope_id", scope.id.clone())
        .param("labels", concept.labels.clone())
        .param("k", k as i64);

        let mut hits = Vec::new();
        for row in self.fetch(q).await? {
            hits.push(SimilarConcept {
                id: row.get("id")?,
                similarity: row.get("score")?,
            });
        }
        Ok(hits)
    }

    async fn concept_properties(&mut self, id: &str) -> Result<Option<PropertyMap>, StoreError> {
        let q = query("MATCH (c:Concept {id: $id}) RETURN properties(c) AS props")
            .param("id", id.to_string());

        let rows = self.fetch(q).await?;
        match rows.first() {
            Some(row) => match row.get::<Value>("props")? {
                Value::Object(map) => Ok(Some(map)),
                _ => Ok(Some(PropertyMap::new())),
            },
            None => Ok(None),
        }
    }

    async fn incident_relationships(
        &mut self,
        id: &str,
    ) -> Result<Vec<IncidentRelationship>, StoreError> {
        let q = query(
            r#"
            MATCH (c:Concept {id: $id})-[r]->(o)
            RETURN type(r) AS rel_type, 'out' AS dir, elementId(o) AS other,
                   CASE WHEN o:Concept THEN o.id ELSE null END AS other_concept,
                   properties(r) AS props
            UNION ALL
            MATCH (c:Concept {id: $id})<-[r]-(o)
            WHERE o <> c
            RETURN type(r) AS rel_type, 'in' AS dir, elementId(o) AS other,
                   CASE WHEN o:Concept THEN o.id ELSE null END AS other_concept,
                   properties(r) AS props
            "#,
        )
        .param("id", id.to_string());

        let mut rels = Vec::new();
        for row in self.fetch(q).await? {
            let dir: String = row.get("dir")?;
            let properties = match row.get::<Value>("props")? {
                Value::Object(map) => map,
                _ => PropertyMap::new(),
            };
            rels.push(IncidentRelationship {
                rel_type: row.get("rel_type")?,
                direction: if dir == "out" {
                    RelDirection::Outgoing
                } else {
                    RelDirection::Incoming
                },
                other_element_id: row.get("other")?,
                other_concept_id: row.get::<Option<String>>("other_concept")?,
                properties,
            });
        }
        Ok(rels)
    }

    async fn attach_relationship(
        &mut self,
        id: &str,
        rel: &IncidentRelationship,
    ) -> Result<(), StoreError> {
        let rel_type = validate_identifier(&rel.rel_type)?;
        let pattern = match rel.direction {
            RelDirection::Outgoing => format!("(p)-[r:`{rel_type}`]->(o)"),
            RelDirection::Incoming => format!("(o)-[r:`{rel_type}`]->(p)"),
        };
        let q = query(&format!(
            r#"
            MATCH (p:Concept {{id: $id}})
            MATCH (o) WHERE elementId(o) = $other
            MERGE {pattern}
            SET r += $props
            RETURN count(r) AS n
            "#
        ))
        .param("id", id.to_string())
        .param("other", rel.other_element_id.clone())
        .param("props", json_to_bolt(&Value::Object(rel.properties.clone())));

        if self.fetch_count(q).await? == 0 {
            return Err(StoreError::NotFound(format!(
                "{id} or relationship endpoint {}",
                rel.other_element_id
            )));
        }
        Ok(())
    }

    async fn replace_concept_properties(
        &mut self,
        id: &str,
        properties: &PropertyMap,
    ) -> Result<(), StoreError> {
        let q = query("MATCH (c:Concept {id: $id}) SET c = $props RETURN count(c) AS n")
            .param("id", id.to_string())
            .param("props", json_to_bolt(&Value::Object(properties.clone())));

        if self.fetch_count(q).await? == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_concepts(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let q = query(
            r#"
            MATCH (c:Concept) WHERE c.id IN $ids
            WITH collect(c) AS nodes
            FOREACH (x IN nodes | DETACH DELETE x)
            RETURN size(nodes) AS n
            "#,
        )
        .param("ids", ids.to_vec());

        self.fetch_count(q).await
    }

    async fn count_scoped_concepts(&mut self, scope: &Scope) -> Result<usize, StoreError> {
        let key = scope.scope_type.membership_key();
        let q = query(&format!(
            "MATCH (c:Concept) WHERE $scope_id IN c.`{key}` RETURN count(c) AS n"
        ))
        .param("scope_id", scope.id.clone());

        self.fetch_count(q).await
    }

    async fn scoped_subgraph(&mut self, scope: &Scope) -> Result<ScopedSubgraph, StoreError> {
        let key = scope.scope_type.membership_key();

        let nodes_q = query(&format!(
            "MATCH (c:Concept) WHERE $scope_id IN c.`{key}` RETURN c.id AS id ORDER BY id"
        ))
        .param("scope_id", scope.id.clone());
        let mut nodes = Vec::new();
        for row in self.fetch(nodes_q).await? {
            nodes.push(row.get::<String>("id")?);
        }

        let edges_q = query(&format!(
            r#"
            MATCH (a:Concept)-[r]->(b:Concept)
            WHERE a <> b
              AND $scope_id IN a.`{key}` AND $scope_id IN b.`{key}`
              AND (r.`{key}` IS NULL OR $scope_id IN r.`{key}`)
            RETURN a.id AS src, b.id AS dst
            ORDER BY src, dst
            "#
        ))
        .param("scope_id", scope.id.clone());
        let mut edges = Vec::new();
        for row in self.fetch(edges_q).await? {
            edges.push((row.get::<String>("src")?, row.get::<String>("dst")?));
        }

        Ok(ScopedSubgraph { nodes, edges })
    }

    async fn evidence_chunks(
        &mut self,
        scope: &Scope,
        concept_id: &str,
        limit: usize,
    ) -> Result<Vec<EvidenceChunk>, StoreError> {
        let key = scope.scope_type.membership_key();
        let q = query(&format!(
            r#"
            MATCH (ch:Chunk)-[:MENTIONS]->(:Concept {{id: $id}})
            WHERE $scope_id IN ch.`{key}`
            MATCH (ch)-[:MENTIONS]->(other:Concept)
            WHERE $scope_id IN other.`{key}`
            WITH ch, count(DISTINCT other) AS concept_count
            RETURN ch.id AS id, coalesce(ch.text, '') AS text, concept_count
            ORDER BY concept_count DESC, id
            LIMIT $limit
            "#
        ))
        .param("id", concept_id.to_string())
        .param("scope_id", scope.id.clone())
        .param("limit", limit as i64);

        let mut chunks = Vec::new();
        for row in self.fetch(q).await? {
            chunks.push(EvidenceChunk {
                id: row.get("id")?,
                text: row.get("text")?,
                concept_count: row.get::<i64>("concept_count")?.max(0) as usize,
            });
        }
        Ok(chunks)
    }

    async fn write_attribute(
        &mut self,
        attribute: &str,
        values: &[(String, AttributeValue)],
    ) -> Result<usize, StoreError> {
        let attribute = validate_identifier(attribute)?;
        if values.is_empty() {
            return Ok(0);
        }
        let rows: Vec<Value> = values
            .iter()
            .map(|(id, value)| serde_json::json!({ "id": id, "value": Value::from(*value) }))
            .collect();
        let q = query(&format!(
            r#"
            UNWIND $rows AS row
            MATCH (c:Concept {{id: row.id}})
            SET c.`{attribute}` = row.value
            RETURN count(c) AS n
            "#
        ))
        .param("rows", json_to_bolt(&Value::Array(rows)));

        self.fetch_count(q).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

/// Convert a JSON value into a Bolt parameter.
fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => BoltType::List(BoltList {
            value: items.iter().map(json_to_bolt).collect(),
        }),
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (k, v) in map {
                bolt.put(BoltString::new(k), json_to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}
