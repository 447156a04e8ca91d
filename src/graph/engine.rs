//! Analytics engine - orchestrates the importance and community pipelines.
//!
//! Both pipelines run inside the caller's transaction:
//!
//! 1. **Extraction**: scoped subgraph → petgraph via [`extract_scoped_graph`]
//! 2. **Computation**: PageRank + score statistics, or Louvain on a projection
//! 3. **Persistence**: scope-qualified node attributes via `write_attribute`

use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use super::algorithms::{importance_threshold, louvain_communities, pagerank, score_statistics};
use super::extraction::extract_scoped_graph;
use super::models::{AnalyticsConfig, CommunityReport, ImportanceReport, ImportantConcept};
use super::projection::ProjectionCatalog;
use crate::neo4j::{validate_identifier, AttributeValue, GraphTxn, Scope, StoreError};

/// Real analytics engine. Cheap to clone; clones share the projection catalog.
#[derive(Debug, Clone, Default)]
pub struct GraphAnalyticsEngine {
    config: AnalyticsConfig,
    catalog: ProjectionCatalog,
}

impl GraphAnalyticsEngine {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            config,
            catalog: ProjectionCatalog::new(),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ProjectionCatalog {
        &self.catalog
    }

    /// Score concept importance in `scope` and persist every node's PageRank
    /// under the scope-qualified pagerank attribute.
    pub async fn compute_importance(
        &self,
        txn: &mut dyn GraphTxn,
        scope: &Scope,
    ) -> Result<ImportanceReport, StoreError> {
        let start = Instant::now();
        let attribute = scope.pagerank_attribute();
        validate_identifier(&attribute)?;

        let graph = extract_scoped_graph(txn, scope).await?;
        if graph.is_empty() {
            tracing::info!(scope = %scope, "No concepts in scope, importance skipped");
            return Ok(ImportanceReport {
                computation_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }

        let ranks = pagerank(&graph, &self.config);

        // (id, pagerank, neighbours, score) in node index order
        let mut rows = Vec::with_capacity(graph.node_count());
        for idx in graph.graph.node_indices() {
            let id = graph.graph[idx].id.clone();
            let rank = ranks.get(&id).copied().unwrap_or(0.0);
            let neighbours = graph.neighbours(&id);
            let score = rank * (1.0 + neighbours.len() as f64).ln();
            rows.push((id, rank, neighbours, score));
        }

        let n = rows.len();
        let scores: Vec<f64> = rows.iter().map(|r| r.3).collect();
        let stats = score_statistics(&scores);
        let threshold = importance_threshold(&stats, n);
        let mean_connections = rows.iter().map(|r| r.2.len()).sum::<usize>() as f64 / n as f64;
        let mean_rank = rows.iter().map(|r| r.1).sum::<f64>() / n as f64;

        let mut concepts: Vec<ImportantConcept> = rows
            .iter()
            .filter(|(_, rank, neighbours, score)| {
                *score >= threshold
                    && (neighbours.len() as f64 > mean_connections || *rank > mean_rank)
            })
            .map(|(id, rank, neighbours, score)| ImportantConcept {
                id: id.clone(),
                score: *score,
                pagerank: *rank,
                connections: neighbours.len(),
                neighbours: neighbours.clone(),
                evidence: Vec::new(),
            })
            .collect();
        concepts.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

        for concept in concepts.iter_mut() {
            concept.evidence = txn
                .evidence_chunks(scope, &concept.id, self.config.evidence_per_concept)
                .await?;
        }

        let values: Vec<(String, AttributeValue)> = rows
            .iter()
            .map(|(id, rank, _, _)| (id.clone(), AttributeValue::Float(*rank)))
            .collect();
        let updated_nodes = txn.write_attribute(&attribute, &values).await?;

        let report = ImportanceReport {
            node_count: n,
            edge_count: graph.edge_count(),
            mean_score: stats.mean,
            std_dev: stats.std_dev,
            p75: stats.p75,
            threshold,
            updated_nodes,
            concepts,
            computation_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            scope = %scope,
            nodes = report.node_count,
            selected = report.concepts.len(),
            threshold = report.threshold,
            ms = report.computation_ms,
            "Importance computed"
        );
        Ok(report)
    }

    /// Detect topic communities in `scope` and persist each node's community
    /// id under the scope-qualified community attribute.
    pub async fn detect_communities(
        &self,
        txn: &mut dyn GraphTxn,
        scope: &Scope,
    ) -> Result<CommunityReport, StoreError> {
        let start = Instant::now();
        let attribute = scope.community_attribute();
        validate_identifier(&attribute)?;

        if txn.count_scoped_concepts(scope).await? == 0 {
            tracing::info!(scope = %scope, "No concepts in scope, community detection skipped");
            return Ok(CommunityReport {
                computation_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }

        let graph = extract_scoped_graph(txn, scope).await?;
        let name = format!("{}_{}", scope.attribute("louvain"), Uuid::new_v4().simple());
        let projection = self.catalog.project(name, graph)?;

        let (assignments, communities, modularity) = louvain_communities(
            projection.graph(),
            self.config.louvain_resolution,
            self.config.louvain_max_iterations,
        );
        let mut values: Vec<(String, AttributeValue)> = assignments
            .into_iter()
            .map(|(id, community)| (id, AttributeValue::Integer(i64::from(community))))
            .collect();
        values.sort_by(|a, b| a.0.cmp(&b.0));

        let updated_nodes = txn.write_attribute(&attribute, &values).await?;
        projection.release();

        let report = CommunityReport {
            updated_nodes,
            community_count: communities.len(),
            modularity,
            communities,
            computation_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            scope = %scope,
            updated = report.updated_nodes,
            communities = report.community_count,
            modularity = report.modularity,
            ms = report.computation_ms,
            "Communities detected"
        );
        Ok(report)
    }
}

/// Community id per concept, from a report's member lists.
pub fn community_assignments(report: &CommunityReport) -> HashMap<String, u32> {
    report
        .communities
        .iter()
        .flat_map(|c| c.members.iter().map(move |m| (m.clone(), c.id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::mock::MockGraphStore;
    use crate::neo4j::GraphStore;
    use serde_json::{json, Value};

    async fn hub_graph() -> MockGraphStore {
        let store = MockGraphStore::new();
        store
            .add_concept("hub", &[], None, json!({"course_ids": ["c1"], "note_ids": ["n1"]}))
            .await;
        for i in 0..6 {
            let leaf = format!("leaf_{i}");
            store
                .add_concept(&leaf, &[], None, json!({"course_ids": ["c1"], "note_ids": ["n1"]}))
                .await;
            store.relate(&leaf, "RELATED_TO", "hub", json!({})).await;
        }
        store
            .add_concept("elsewhere", &[], None, json!({"course_ids": ["c2"]}))
            .await;
        store.relate("elsewhere", "RELATED_TO", "hub", json!({})).await;

        store.add_chunk("ch1", "hub with two leaves", &["c1"], &["n1"]).await;
        store.mention("ch1", "hub").await;
        store.mention("ch1", "leaf_0").await;
        store.mention("ch1", "leaf_1").await;
        store.add_chunk("ch2", "hub alone", &["c1"], &["n1"]).await;
        store.mention("ch2", "hub").await;
        store.add_chunk("ch3", "hub and leaf 2", &["c1"], &["n1"]).await;
        store.mention("ch3", "hub").await;
        store.mention("ch3", "leaf_2").await;
        store.add_chunk("ch4", "hub and leaf 3", &["c1"], &["n1"]).await;
        store.mention("ch4", "hub").await;
        store.mention("ch4", "leaf_3").await;
        store.add_chunk("other", "other course", &["c2"], &[]).await;
        store.mention("other", "hub").await;
        store
    }

    async fn importance(
        store: &MockGraphStore,
        engine: &GraphAnalyticsEngine,
        scope: &Scope,
    ) -> ImportanceReport {
        let mut txn = store.begin().await.unwrap();
        let report = engine.compute_importance(txn.as_mut(), scope).await.unwrap();
        txn.commit().await.unwrap();
        report
    }

    async fn communities(
        store: &MockGraphStore,
        engine: &GraphAnalyticsEngine,
        scope: &Scope,
    ) -> Result<CommunityReport, StoreError> {
        let mut txn = store.begin().await?;
        let report = engine.detect_communities(txn.as_mut(), scope).await?;
        txn.commit().await?;
        Ok(report)
    }

    #[tokio::test]
    async fn test_importance_selects_hub_with_ranked_evidence() {
        let store = hub_graph().await;
        let engine = GraphAnalyticsEngine::default();

        let report = importance(&store, &engine, &Scope::course("c1")).await;

        assert_eq!(report.node_count, 7);
        assert_eq!(report.updated_nodes, 7);
        assert_eq!(report.concepts.len(), 1);
        let hub = &report.concepts[0];
        assert_eq!(hub.id, "hub");
        assert_eq!(hub.connections, 6);
        assert_eq!(hub.neighbours.len(), 6);
        let evidence: Vec<&str> = hub.evidence.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(evidence, vec!["ch1", "ch3", "ch4"]);
        assert_eq!(hub.evidence[0].concept_count, 3);
        assert!(hub.score >= report.threshold);
    }

    #[tokio::test]
    async fn test_importance_is_idempotent() {
        let store = hub_graph().await;
        let engine = GraphAnalyticsEngine::default();
        let scope = Scope::course("c1");

        let first = importance(&store, &engine, &scope).await;
        let after_first = store.snapshot().await;
        let second = importance(&store, &engine, &scope).await;
        let after_second = store.snapshot().await;

        for id in after_first.concept_ids() {
            let a = after_first.concept(&id).unwrap();
            let b = after_second.concept(&id).unwrap();
            assert_eq!(a, b, "concept {id} changed on the second run");
            let pagerank_keys = b.keys().filter(|k| k.ends_with("_pagerank")).count();
            assert!(pagerank_keys <= 1);
        }
        assert_eq!(first.concepts.len(), second.concepts.len());
        assert_eq!(
            first.concepts[0].score.to_bits(),
            second.concepts[0].score.to_bits()
        );
    }

    #[tokio::test]
    async fn test_importance_writes_scope_qualified_attribute_only() {
        let store = hub_graph().await;
        let engine = GraphAnalyticsEngine::default();

        importance(&store, &engine, &Scope::note("n1")).await;

        let graph = store.snapshot().await;
        let hub = graph.concept("hub").unwrap();
        assert!(hub.get("note_n1_pagerank").and_then(Value::as_f64).is_some());
        assert!(hub.get("course_c1_pagerank").is_none());
        assert!(graph
            .concept("elsewhere")
            .unwrap()
            .get("note_n1_pagerank")
            .is_none());
    }

    #[tokio::test]
    async fn test_importance_on_empty_scope() {
        let store = hub_graph().await;
        let report = importance(&store, &GraphAnalyticsEngine::default(), &Scope::course("none")).await;
        assert_eq!(report.node_count, 0);
        assert_eq!(report.updated_nodes, 0);
        assert!(report.concepts.is_empty());
    }

    #[tokio::test]
    async fn test_similar_scope_ids_keep_separate_attributes() {
        let store = MockGraphStore::new();
        for id in ["a", "b"] {
            store
                .add_concept(id, &[], None, json!({"course_ids": ["c-1", "c_1"]}))
                .await;
        }
        store.relate("a", "RELATED_TO", "b", json!({})).await;
        let engine = GraphAnalyticsEngine::default();

        importance(&store, &engine, &Scope::course("c-1")).await;
        importance(&store, &engine, &Scope::course("c_1")).await;

        let a = store.snapshot().await.concept("a").unwrap();
        let mut keys: Vec<&String> = a.keys().filter(|k| k.ends_with("_pagerank")).collect();
        keys.sort();
        assert_eq!(keys, vec!["course_c__1_pagerank", "course_c_x2d_1_pagerank"]);
    }

    #[tokio::test]
    async fn test_communities_on_empty_scope_do_not_project() {
        let store = hub_graph().await;
        store.fail_always("scoped_subgraph", || StoreError::Other(anyhow::anyhow!("not expected")));
        let engine = GraphAnalyticsEngine::default();

        let report = communities(&store, &engine, &Scope::course("none"))
            .await
            .unwrap();

        assert_eq!(report.updated_nodes, 0);
        assert_eq!(report.community_count, 0);
        assert_eq!(engine.catalog().created_count(), 0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["updatedNodes"], 0);
        assert_eq!(json["communityCount"], 0);
    }

    #[tokio::test]
    async fn test_communities_write_attribute_and_drop_projection() {
        let store = MockGraphStore::new();
        for prefix in ["a", "b"] {
            for i in 0..4 {
                store
                    .add_concept(&format!("{prefix}{i}"), &[], None, json!({"course_ids": ["c1"]}))
                    .await;
            }
            for i in 0..4 {
                for j in 0..4 {
                    if i != j {
                        store
                            .relate(&format!("{prefix}{i}"), "RELATED_TO", &format!("{prefix}{j}"), json!({}))
                            .await;
                    }
                }
            }
        }
        store.relate("a0", "RELATED_TO", "b0", json!({})).await;
        let engine = GraphAnalyticsEngine::default();

        let report = communities(&store, &engine, &Scope::course("c1"))
            .await
            .unwrap();

        assert_eq!(report.updated_nodes, 8);
        assert_eq!(report.community_count, 2);
        assert_eq!(engine.catalog().created_count(), 1);
        assert!(engine.catalog().is_empty());

        let graph = store.snapshot().await;
        let community = |id: &str| graph.concept(id).unwrap()["course_c1_community"].clone();
        assert_eq!(community("a0"), community("a3"));
        assert_eq!(community("b0"), community("b3"));
        assert_ne!(community("a0"), community("b0"));

        let assignments = community_assignments(&report);
        assert_eq!(assignments.len(), 8);
        assert_eq!(json!(assignments["a1"]), community("a1"));
    }

    #[tokio::test]
    async fn test_communities_tear_down_projection_on_failure() {
        let store = hub_graph().await;
        store.fail_next("write_attribute", 1, || StoreError::deadlock("lock cycle"));
        let engine = GraphAnalyticsEngine::default();

        let err = communities(&store, &engine, &Scope::course("c1"))
            .await
            .unwrap_err();

        assert!(err.class().is_retryable());
        assert_eq!(engine.catalog().created_count(), 1);
        assert!(engine.catalog().is_empty());
        assert!(store
            .snapshot()
            .await
            .concept("hub")
            .unwrap()
            .get("course_c1_community")
            .is_none());
    }
}
