//! Graph analytics data models.
//!
//! ## Input types (extraction)
//! - [`ConceptNode`] / [`ConceptEdge`] - scoped concepts and their relationships
//! - [`ConceptGraph`] - petgraph wrapper with ID ↔ NodeIndex mapping
//!
//! ## Output types (analytics)
//! - [`ImportantConcept`] / [`ImportanceReport`] - result of importance scoring
//! - [`CommunityInfo`] / [`CommunityReport`] - result of community detection
//!
//! ## Configuration
//! - [`AnalyticsConfig`] - tuning parameters for the analytics algorithms

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::neo4j::EvidenceChunk;

// ============================================================================
// Input types - Graph structure (extraction → algorithms)
// ============================================================================

/// A concept node of the scoped subgraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
}

/// A relationship between two concepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEdge {
    /// Edge weight (default: 1.0)
    pub weight: f64,
}

impl Default for ConceptEdge {
    fn default() -> Self {
        Self { weight: 1.0 }
    }
}

// ============================================================================
// ConceptGraph - petgraph wrapper with ID mapping
// ============================================================================

/// Wrapper around `petgraph::DiGraph` with bidirectional ID ↔ NodeIndex mapping.
///
/// Nodes are indexed in insertion order, which the extractor keeps sorted by
/// id so that every algorithm visits them in the same order on every run.
#[derive(Debug, Clone)]
pub struct ConceptGraph {
    /// The underlying directed graph
    pub graph: DiGraph<ConceptNode, ConceptEdge>,
    /// Mapping from concept id to petgraph NodeIndex
    pub id_to_index: HashMap<String, NodeIndex>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            id_to_index: HashMap::new(),
        }
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(nodes, edges),
            id_to_index: HashMap::with_capacity(nodes),
        }
    }

    /// Add a node to the graph. Returns the NodeIndex.
    /// If a node with the same ID already exists, returns its existing index.
    pub fn add_node(&mut self, id: impl Into<String>) -> NodeIndex {
        let id = id.into();
        if let Some(&idx) = self.id_to_index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(ConceptNode { id: id.clone() });
        self.id_to_index.insert(id, idx);
        idx
    }

    /// Add an edge between two nodes identified by their IDs.
    /// Returns `Some(EdgeIndex)` if both nodes exist, `None` otherwise.
    pub fn add_edge(
        &mut self,
        from_id: &str,
        to_id: &str,
        edge: ConceptEdge,
    ) -> Option<petgraph::graph::EdgeIndex> {
        let from_idx = self.id_to_index.get(from_id)?;
        let to_idx = self.id_to_index.get(to_id)?;
        Some(self.graph.add_edge(*from_idx, *to_idx, edge))
    }

    pub fn get_index(&self, id: &str) -> Option<NodeIndex> {
        self.id_to_index.get(id).copied()
    }

    /// Distinct neighbours of a node in either direction, sorted, self excluded.
    pub fn neighbours(&self, id: &str) -> Vec<String> {
        let Some(idx) = self.get_index(id) else {
            return Vec::new();
        };
        self.graph
            .neighbors_undirected(idx)
            .filter(|n| *n != idx)
            .map(|n| self.graph[n].id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Default for ConceptGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Output types - Importance
// ============================================================================

/// A concept selected as important within its scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportantConcept {
    pub id: String,
    /// `pagerank * ln(1 + connections)`
    pub score: f64,
    pub pagerank: f64,
    /// Number of distinct neighbours
    pub connections: usize,
    pub neighbours: Vec<String>,
    /// Chunks mentioning the concept, most concept-dense first
    pub evidence: Vec<EvidenceChunk>,
}

/// Result of importance scoring for one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportanceReport {
    pub node_count: usize,
    pub edge_count: usize,
    pub mean_score: f64,
    pub std_dev: f64,
    pub p75: f64,
    pub threshold: f64,
    /// Nodes whose scope-qualified pagerank attribute was written
    pub updated_nodes: usize,
    pub concepts: Vec<ImportantConcept>,
    pub computation_ms: u64,
}

// ============================================================================
// Output types - Communities
// ============================================================================

/// Metadata about a community detected by the Louvain algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityInfo {
    /// Community identifier
    pub id: u32,
    /// Number of nodes in this community
    pub size: usize,
    /// Concept ids belonging to this community, sorted
    pub members: Vec<String>,
}

/// Result of community detection for one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityReport {
    pub updated_nodes: usize,
    pub community_count: usize,
    pub modularity: f64,
    pub communities: Vec<CommunityInfo>,
    pub computation_ms: u64,
}

// ============================================================================
// Configuration
// ============================================================================

/// Tuning parameters for graph analytics algorithms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// PageRank damping factor (default: 0.85)
    pub pagerank_damping: f64,
    /// PageRank convergence tolerance (default: 1e-6)
    pub pagerank_tolerance: f64,
    /// PageRank maximum iterations (default: 100)
    pub pagerank_max_iterations: usize,
    /// Louvain resolution parameter (default: 1.0, higher = smaller communities)
    pub louvain_resolution: f64,
    /// Louvain maximum iterations (default: 100)
    pub louvain_max_iterations: usize,
    /// Evidence chunks attached to each important concept (default: 3)
    pub evidence_per_concept: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            pagerank_damping: 0.85,
            pagerank_tolerance: 1e-6,
            pagerank_max_iterations: 100,
            louvain_resolution: 1.0,
            louvain_max_iterations: 100,
            evidence_per_concept: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytics_config_defaults() {
        let config = AnalyticsConfig::default();
        assert!((config.pagerank_damping - 0.85).abs() < f64::EPSILON);
        assert!((config.louvain_resolution - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.evidence_per_concept, 3);
    }

    #[test]
    fn test_analytics_config_partial_yaml() {
        let config: AnalyticsConfig = serde_yaml::from_str("louvain_resolution: 0.5").unwrap();
        assert!((config.louvain_resolution - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.pagerank_max_iterations, 100);
    }

    #[test]
    fn test_concept_graph_add_node_idempotent() {
        let mut g = ConceptGraph::new();
        let a = g.add_node("a");
        assert_eq!(g.add_node("a"), a);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.get_index("a"), Some(a));
        assert!(g.get_index("missing").is_none());
    }

    #[test]
    fn test_concept_graph_add_edge_requires_both_nodes() {
        let mut g = ConceptGraph::new();
        g.add_node("a");
        g.add_node("b");
        assert!(g.add_edge("a", "b", ConceptEdge::default()).is_some());
        assert!(g.add_edge("a", "missing", ConceptEdge::default()).is_none());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_neighbours_are_distinct_and_undirected() {
        let mut g = ConceptGraph::new();
        for id in ["a", "b", "c"] {
            g.add_node(id);
        }
        g.add_edge("a", "b", ConceptEdge::default());
        g.add_edge("b", "a", ConceptEdge::default());
        g.add_edge("c", "a", ConceptEdge::default());
        g.add_edge("a", "a", ConceptEdge::default());
        assert_eq!(g.neighbours("a"), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(g.neighbours("b"), vec!["a".to_string()]);
        assert!(g.neighbours("missing").is_empty());
    }

    #[test]
    fn test_community_report_uses_camel_case() {
        let json = serde_json::to_value(CommunityReport::default()).unwrap();
        assert_eq!(json["updatedNodes"], 0);
        assert_eq!(json["communityCount"], 0);
    }
}
