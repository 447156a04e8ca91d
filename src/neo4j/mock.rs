//! In-memory mock implementation of GraphStore for testing.
//!
//! The whole graph lives in one `GraphState` behind a `tokio::sync::RwLock`.
//! A transaction takes the write lock for its lifetime, works on a copy, and
//! swaps the copy in on commit, so uncommitted writes are never observed.
//! Failures can be injected per operation name.
//! Conditionally compiled with `#[cfg(test)]`.

use crate::neo4j::error::StoreError;
use crate::neo4j::models::*;
use crate::neo4j::traits::{GraphStore, GraphTxn};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone)]
struct MockNode {
    labels: BTreeSet<String>,
    props: PropertyMap,
}

impl MockNode {
    fn id(&self) -> Option<&str> {
        self.props.get("id").and_then(Value::as_str)
    }

    fn is(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    fn in_scope(&self, scope: &Scope) -> bool {
        list_contains(&self.props, scope.scope_type.membership_key(), &scope.id)
    }

    fn embedding(&self) -> Option<Vec<f32>> {
        let items = self.props.get("embedding")?.as_array()?;
        items
            .iter()
            .map(|v| v.as_f64().map(|x| x as f32))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct MockRel {
    rel_type: String,
    src: u64,
    dst: u64,
    props: PropertyMap,
}

/// Full content of the mock graph.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    nodes: BTreeMap<u64, MockNode>,
    rels: Vec<MockRel>,
    next_key: u64,
}

impl GraphState {
    fn insert(&mut self, labels: &[&str], props: PropertyMap) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.nodes.insert(
            key,
            MockNode {
                labels: labels.iter().map(|l| l.to_string()).collect(),
                props,
            },
        );
        key
    }

    fn key_of(&self, label: &str, id: &str) -> Option<u64> {
        self.nodes
            .iter()
            .find(|(_, n)| n.is(label) && n.id() == Some(id))
            .map(|(k, _)| *k)
    }

    fn concept_key(&self, id: &str) -> Option<u64> {
        self.key_of("Concept", id)
    }

    fn concept_id_of(&self, key: u64) -> Option<String> {
        self.nodes
            .get(&key)
            .filter(|n| n.is("Concept"))
            .and_then(|n| n.id().map(str::to_string))
    }

    /// Properties of a concept.
    pub fn concept(&self, id: &str) -> Option<PropertyMap> {
        self.concept_key(id)
            .and_then(|k| self.nodes.get(&k))
            .map(|n| n.props.clone())
    }

    /// Ids of all concepts, sorted.
    pub fn concept_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.is("Concept"))
            .filter_map(|n| n.id().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }

    /// `(source id, type, target id)` for every relationship, sorted.
    pub fn relationships(&self) -> Vec<(String, String, String)> {
        let id_of = |key: u64| {
            self.nodes
                .get(&key)
                .and_then(|n| n.id().map(str::to_string))
                .unwrap_or_default()
        };
        let mut rels: Vec<_> = self
            .rels
            .iter()
            .map(|r| (id_of(r.src), r.rel_type.clone(), id_of(r.dst)))
            .collect();
        rels.sort();
        rels
    }
}

fn element_id(key: u64) -> String {
    format!("mock:{key}")
}

fn parse_element_id(element_id: &str) -> Option<u64> {
    element_id.strip_prefix("mock:")?.parse().ok()
}

fn list_contains(props: &PropertyMap, key: &str, needle: &str) -> bool {
    props
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().any(|v| v.as_str() == Some(needle)))
        .unwrap_or(false)
}

/// Cosine similarity mapped to `[0, 1]` the way Neo4j's cosine vector index scores it.
fn index_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    (1.0 + dot / (na * nb)) / 2.0
}

// ============================================================================
// Fault injection
// ============================================================================

struct Fault {
    remaining: usize,
    make: fn() -> StoreError,
}

type Faults = Arc<Mutex<HashMap<String, Fault>>>;

fn take_fault(faults: &Faults, op: &str) -> Result<(), StoreError> {
    let mut faults = match faults.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(fault) = faults.get_mut(op) {
        if fault.remaining > 0 {
            fault.remaining -= 1;
            return Err((fault.make)());
        }
    }
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

/// In-memory mock implementation of GraphStore for testing.
#[derive(Clone, Default)]
pub struct MockGraphStore {
    state: Arc<RwLock<GraphState>>,
    faults: Faults,
    begins: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl MockGraphStore {
    /// Create a new empty MockGraphStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with the error built by `make`.
    ///
    /// `op` is a `GraphTxn` method name, or `begin`.
    pub fn fail_next(&self, op: &str, times: usize, make: fn() -> StoreError) {
        let mut faults = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        faults.insert(
            op.to_string(),
            Fault {
                remaining: times,
                make,
            },
        );
    }

    /// Make every call of `op` fail.
    pub fn fail_always(&self, op: &str, make: fn() -> StoreError) {
        self.fail_next(op, usize::MAX, make);
    }

    pub fn begin_count(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Copy of the committed graph.
    pub async fn snapshot(&self) -> GraphState {
        self.state.read().await.clone()
    }

    /// Add a concept. `props` must be a JSON object; `id` and `embedding` are set from the arguments.
    pub async fn add_concept(
        &self,
        id: &str,
        extra_labels: &[&str],
        embedding: Option<Vec<f32>>,
        props: Value,
    ) {
        let mut map = match props {
            Value::Object(map) => map,
            _ => PropertyMap::new(),
        };
        map.insert("id".into(), Value::from(id));
        if let Some(embedding) = embedding {
            map.insert("embedding".into(), serde_json::json!(embedding));
        }
        let mut labels = vec!["Concept"];
        labels.extend_from_slice(extra_labels);
        self.state.write().await.insert(&labels, map);
    }

    /// Add a chunk belonging to the given courses and notes.
    pub async fn add_chunk(&self, id: &str, text: &str, course_ids: &[&str], note_ids: &[&str]) {
        let props = serde_json::json!({
            "id": id,
            "text": text,
            "course_ids": course_ids,
            "note_ids": note_ids,
        });
        if let Value::Object(map) = props {
            self.state.write().await.insert(&["Chunk"], map);
        }
    }

    /// Add `(src)-[:rel_type]->(dst)`. Endpoints are looked up by id, concepts first.
    pub async fn relate(&self, src: &str, rel_type: &str, dst: &str, props: Value) {
        let mut state = self.state.write().await;
        let find = |state: &GraphState, id: &str| {
            state
                .concept_key(id)
                .or_else(|| state.key_of("Chunk", id))
        };
        if let (Some(s), Some(d)) = (find(&state, src), find(&state, dst)) {
            let props = match props {
                Value::Object(map) => map,
                _ => PropertyMap::new(),
            };
            state.rels.push(MockRel {
                rel_type: rel_type.to_string(),
                src: s,
                dst: d,
                props,
            });
        }
    }

    /// Add `(chunk)-[:MENTIONS]->(concept)`.
    pub async fn mention(&self, chunk: &str, concept: &str) {
        self.relate(chunk, "MENTIONS", concept, Value::Null).await;
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        take_fault(&self.faults, "begin")?;
        let guard = self.state.clone().write_owned().await;
        let work = guard.clone();
        Ok(Box::new(MockTxn {
            guard,
            work,
            faults: self.faults.clone(),
            commits: self.commits.clone(),
            rollbacks: self.rollbacks.clone(),
        }))
    }
}

// ============================================================================
// Transaction
// ============================================================================

struct MockTxn {
    guard: OwnedRwLockWriteGuard<GraphState>,
    work: GraphState,
    faults: Faults,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl MockTxn {
    fn check(&self, op: &str) -> Result<(), StoreError> {
        take_fault(&self.faults, op)
    }
}

#[async_trait]
impl GraphTxn for MockTxn {
    async fn concepts_with_embeddings(
        &mut self,
        scope: &Scope,
    ) -> Result<Vec<ConceptRecord>, StoreError> {
        self.check("concepts_with_embeddings")?;
        let mut concepts: Vec<ConceptRecord> = self
            .work
            .nodes
            .values()
            .filter(|n| n.is("Concept") && n.in_scope(scope))
            .filter_map(|n| {
                Some(ConceptRecord {
                    id: n.id()?.to_string(),
                    labels: n.labels.iter().cloned().collect(),
                    embedding: n.embedding()?,
                })
            })
            .collect();
        concepts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(concepts)
    }

    async fn nearest_concepts(
        &mut self,
        concept: &ConceptRecord,
        k: usize,
        scope: &Scope,
    ) -> Result<Vec<SimilarConcept>, StoreError> {
        self.check("nearest_concepts")?;
        let mut hits: Vec<SimilarConcept> = self
            .work
            .nodes
            .values()
            .filter(|n| n.is("Concept") && n.in_scope(scope) && n.id() != Some(concept.id.as_str()))
            .filter(|n| n.labels.iter().eq(concept.labels.iter()))
            .filter_map(|n| {
                let embedding = n.embedding()?;
                Some(SimilarConcept {
                    id: n.id()?.to_string(),
                    similarity: index_similarity(&concept.embedding, &embedding),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn concept_properties(&mut self, id: &str) -> Result<Option<PropertyMap>, StoreError> {
        self.check("concept_properties")?;
        Ok(self.work.concept(id))
    }

    async fn incident_relationships(
        &mut self,
        id: &str,
    ) -> Result<Vec<IncidentRelationship>, StoreError> {
        self.check("incident_relationships")?;
        let Some(key) = self.work.concept_key(id) else {
            return Ok(Vec::new());
        };
        let mut rels = Vec::new();
        for rel in &self.work.rels {
            let (direction, other) = if rel.src == key {
                (RelDirection::Outgoing, rel.dst)
            } else if rel.dst == key {
                (RelDirection::Incoming, rel.src)
            } else {
                continue;
            };
            rels.push(IncidentRelationship {
                rel_type: rel.rel_type.clone(),
                direction,
                other_element_id: element_id(other),
                other_concept_id: self.work.concept_id_of(other),
                properties: rel.props.clone(),
            });
        }
        Ok(rels)
    }

    async fn attach_relationship(
        &mut self,
        id: &str,
        rel: &IncidentRelationship,
    ) -> Result<(), StoreError> {
        self.check("attach_relationship")?;
        validate_identifier(&rel.rel_type)?;
        let key = self
            .work
            .concept_key(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let other = parse_element_id(&rel.other_element_id)
            .filter(|k| self.work.nodes.contains_key(k))
            .ok_or_else(|| StoreError::NotFound(rel.other_element_id.clone()))?;
        let (src, dst) = match rel.direction {
            RelDirection::Outgoing => (key, other),
            RelDirection::Incoming => (other, key),
        };
        match self
            .work
            .rels
            .iter_mut()
            .find(|r| r.src == src && r.dst == dst && r.rel_type == rel.rel_type)
        {
            Some(existing) => {
                for (k, v) in &rel.properties {
                    existing.props.insert(k.clone(), v.clone());
                }
            }
            None => self.work.rels.push(MockRel {
                rel_type: rel.rel_type.clone(),
                src,
                dst,
                props: rel.properties.clone(),
            }),
        }
        Ok(())
    }

    async fn replace_concept_properties(
        &mut self,
        id: &str,
        properties: &PropertyMap,
    ) -> Result<(), StoreError> {
        self.check("replace_concept_properties")?;
        let key = self
            .work
            .concept_key(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(node) = self.work.nodes.get_mut(&key) {
            node.props = properties.clone();
        }
        Ok(())
    }

    async fn delete_concepts(&mut self, ids: &[String]) -> Result<usize, StoreError> {
        self.check("delete_concepts")?;
        let keys: Vec<u64> = ids
            .iter()
            .filter_map(|id| self.work.concept_key(id))
            .collect();
        for key in &keys {
            self.work.nodes.remove(key);
        }
        self.work
            .rels
            .retain(|r| !keys.contains(&r.src) && !keys.contains(&r.dst));
        Ok(keys.len())
    }

    async fn count_scoped_concepts(&mut self, scope: &Scope) -> Result<usize, StoreError> {
        self.check("count_scoped_concepts")?;
        Ok(self
            .work
            .nodes
            .values()
            .filter(|n| n.is("Concept") && n.in_scope(scope))
            .count())
    }

    async fn scoped_subgraph(&mut self, scope: &Scope) -> Result<ScopedSubgraph, StoreError> {
        self.check("scoped_subgraph")?;
        let scoped: HashMap<u64, String> = self
            .work
            .nodes
            .iter()
            .filter(|(_, n)| n.is("Concept") && n.in_scope(scope))
            .filter_map(|(k, n)| n.id().map(|id| (*k, id.to_string())))
            .collect();

        let mut nodes: Vec<String> = scoped.values().cloned().collect();
        nodes.sort();

        let key = scope.scope_type.membership_key();
        let mut edges: Vec<(String, String)> = self
            .work
            .rels
            .iter()
            .filter(|r| r.src != r.dst)
            .filter(|r| !r.props.contains_key(key) || list_contains(&r.props, key, &scope.id))
            .filter_map(|r| Some((scoped.get(&r.src)?.clone(), scoped.get(&r.dst)?.clone())))
            .collect();
        edges.sort();

        Ok(ScopedSubgraph { nodes, edges })
    }

    async fn evidence_chunks(
        &mut self,
        scope: &Scope,
        concept_id: &str,
        limit: usize,
    ) -> Result<Vec<EvidenceChunk>, StoreError> {
        self.check("evidence_chunks")?;
        let Some(target) = self.work.concept_key(concept_id) else {
            return Ok(Vec::new());
        };
        let mentions = |chunk: u64| -> BTreeSet<u64> {
            self.work
                .rels
                .iter()
                .filter(|r| r.src == chunk && r.rel_type == "MENTIONS")
                .map(|r| r.dst)
                .collect()
        };

        let mut chunks = Vec::new();
        for (key, node) in &self.work.nodes {
            if !node.is("Chunk") || !node.in_scope(scope) {
                continue;
            }
            let mentioned = mentions(*key);
            if !mentioned.contains(&target) {
                continue;
            }
            let concept_count = mentioned
                .iter()
                .filter_map(|k| self.work.nodes.get(k))
                .filter(|n| n.is("Concept") && n.in_scope(scope))
                .count();
            chunks.push(EvidenceChunk {
                id: node.id().unwrap_or_default().to_string(),
                text: node
                    .props
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                concept_count,
            });
        }
        chunks.sort_by(|a, b| {
            b.concept_count
                .cmp(&a.concept_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        chunks.truncate(limit);
        Ok(chunks)
    }

    async fn write_attribute(
        &mut self,
        attribute: &str,
        values: &[(String, AttributeValue)],
    ) -> Result<usize, StoreError> {
        self.check("write_attribute")?;
        validate_identifier(attribute)?;
        let mut updated = 0;
        for (id, value) in values {
            if let Some(key) = self.work.concept_key(id) {
                if let Some(node) = self.work.nodes.get_mut(&key) {
                    node.props.insert(attribute.to_string(), Value::from(*value));
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        take_fault(&self.faults, "commit")?;
        let MockTxn {
            mut guard,
            work,
            commits,
            ..
        } = *self;
        *guard = work;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seeded() -> MockGraphStore {
        let store = MockGraphStore::new();
        store
            .add_concept("a", &[], Some(vec![1.0, 0.0]), json!({"course_ids": ["c1"]}))
            .await;
        store
            .add_concept("b", &[], Some(vec![0.9, 0.1]), json!({"course_ids": ["c1"]}))
            .await;
        store
            .add_concept("z", &[], Some(vec![1.0, 0.0]), json!({"course_ids": ["c2"]}))
            .await;
        store.relate("a", "RELATED_TO", "b", json!({})).await;
        store
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = seeded().await;
        let mut txn = store.begin().await.unwrap();
        txn.delete_concepts(&["a".to_string()]).await.unwrap();
        drop(txn);

        assert!(store.snapshot().await.concept("a").is_some());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = seeded().await;
        let mut txn = store.begin().await.unwrap();
        txn.write_attribute(
            "course_c1_pagerank",
            &[("a".to_string(), AttributeValue::Float(0.5))],
        )
        .await
        .unwrap();
        txn.commit().await.unwrap();

        let a = store.snapshot().await.concept("a").unwrap();
        assert_eq!(a["course_c1_pagerank"], json!(0.5));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_nearest_concepts_respects_scope() {
        let store = seeded().await;
        let mut txn = store.begin().await.unwrap();
        let scope = Scope::course("c1");
        let concepts = txn.concepts_with_embeddings(&scope).await.unwrap();
        assert_eq!(concepts.len(), 2);

        let hits = txn.nearest_concepts(&concepts[0], 10, &scope).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
        assert!(hits[0].similarity > 0.9);
    }

    #[tokio::test]
    async fn test_fault_injection_is_consumed() {
        let store = seeded().await;
        store.fail_next("count_scoped_concepts", 1, || StoreError::deadlock("boom"));
        let mut txn = store.begin().await.unwrap();
        let scope = Scope::course("c1");
        assert!(txn.count_scoped_concepts(&scope).await.is_err());
        assert_eq!(txn.count_scoped_concepts(&scope).await.unwrap(), 2);
    }
}
