//! Store → petgraph extraction.
//!
//! Converts the scoped concept subgraph into an in-memory `ConceptGraph`
//! suitable for analytics computation. Reads go through the open [`GraphTxn`]
//! so analytics see the same snapshot they write into.

use crate::neo4j::{GraphTxn, Scope, ScopedSubgraph, StoreError};

use super::models::{ConceptEdge, ConceptGraph};

/// Extract the concept graph of `scope`.
///
/// - Nodes: concepts whose scoping list contains the scope id
/// - Edges: concept–concept relationships between them that are not scoped to
///   a different course or note
pub async fn extract_scoped_graph(
    txn: &mut dyn GraphTxn,
    scope: &Scope,
) -> Result<ConceptGraph, StoreError> {
    let subgraph = txn.scoped_subgraph(scope).await?;
    let graph = build_concept_graph(&subgraph);
    tracing::debug!(
        scope = %scope,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Extracted scoped concept graph"
    );
    Ok(graph)
}

/// Build a `ConceptGraph` with nodes inserted in sorted id order.
///
/// Edges whose endpoints are not both in the node list, and self loops, are
/// dropped.
pub fn build_concept_graph(subgraph: &ScopedSubgraph) -> ConceptGraph {
    let mut nodes: Vec<&String> = subgraph.nodes.iter().collect();
    nodes.sort();
    nodes.dedup();

    let mut graph = ConceptGraph::with_capacity(nodes.len(), subgraph.edges.len());
    for id in nodes {
        graph.add_node(id.clone());
    }

    let mut edges: Vec<&(String, String)> = subgraph.edges.iter().collect();
    edges.sort();
    for (source, target) in edges {
        if source == target {
            continue;
        }
        graph.add_edge(source, target, ConceptEdge::default());
    }
    graph
}
