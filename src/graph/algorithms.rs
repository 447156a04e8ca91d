//! Graph analytics algorithms.
//!
//! Implements the algorithms behind importance scoring and community detection
//! on [`ConceptGraph`]:
//! - **PageRank** - power iteration
//! - **Community detection (Louvain)** - greedy local moves on the undirected view
//! - **Score statistics** - mean, population standard deviation, 75th percentile
//!   and the size-tiered selection threshold
//!
//! All algorithms visit nodes in index order and break ties by community id,
//! so the same graph always yields the same result.

use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};

use super::models::{AnalyticsConfig, CommunityInfo, ConceptGraph};

// ============================================================================
// PageRank (power iteration)
// ============================================================================

/// Compute PageRank scores for all nodes in the graph.
///
/// Uses the power iteration method with configurable damping factor,
/// tolerance, and max iterations. Returns scores normalized to sum ≈ 1.0.
pub fn pagerank(graph: &ConceptGraph, config: &AnalyticsConfig) -> HashMap<String, f64> {
    let g = &graph.graph;
    let n = g.node_count();
    if n == 0 {
        return HashMap::new();
    }

    let damping = config.pagerank_damping;
    let tolerance = config.pagerank_tolerance;
    let max_iter = config.pagerank_max_iterations;

    // Initialize all scores to 1/n
    let initial = 1.0 / n as f64;
    let mut scores: Vec<f64> = vec![initial; n];
    let mut new_scores: Vec<f64> = vec![0.0; n];

    let out_degrees: Vec<usize> = g
        .node_indices()
        .map(|idx| g.neighbors_directed(idx, Direction::Outgoing).count())
        .collect();

    for _ in 0..max_iter {
        for s in new_scores.iter_mut() {
            *s = (1.0 - damping) / n as f64;
        }

        for idx in g.node_indices() {
            let i = idx.index();
            if out_degrees[i] > 0 {
                let contribution = damping * scores[i] / out_degrees[i] as f64;
                for neighbor in g.neighbors_directed(idx, Direction::Outgoing) {
                    new_scores[neighbor.index()] += contribution;
                }
            } else {
                // Dangling node: distribute evenly to all nodes
                let contribution = damping * scores[i] / n as f64;
                for s in new_scores.iter_mut() {
                    *s += contribution;
                }
            }
        }

        let diff: f64 = scores
            .iter()
            .zip(new_scores.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();

        std::mem::swap(&mut scores, &mut new_scores);

        if diff < tolerance {
            break;
        }
    }

    let total: f64 = scores.iter().sum();
    if total > 0.0 {
        for s in scores.iter_mut() {
            *s /= total;
        }
    }

    g.node_indices()
        .map(|idx| (g[idx].id.clone(), scores[idx.index()]))
        .collect()
}

// ============================================================================
// Community Detection - Louvain
// ============================================================================

/// Detect communities using the Louvain method.
///
/// Returns `(node_to_community, communities, modularity)`. Community ids are
/// contiguous from 0 in order of first appearance by node index.
pub fn louvain_communities(
    graph: &ConceptGraph,
    resolution: f64,
    max_iterations: usize,
) -> (HashMap<String, u32>, Vec<CommunityInfo>, f64) {
    let g = &graph.graph;
    let n = g.node_count();
    if n == 0 {
        return (HashMap::new(), vec![], 0.0);
    }

    let mut adj: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    let mut node_strengths: Vec<f64> = vec![0.0; n];

    for edge in g.edge_references() {
        let s = edge.source().index();
        let t = edge.target().index();
        if s == t {
            continue;
        }
        let w = edge.weight().weight;
        adj[s].push((t, w));
        adj[t].push((s, w));
        node_strengths[s] += w;
        node_strengths[t] += w;
    }

    let total_weight: f64 = node_strengths.iter().sum::<f64>() / 2.0;

    // Initialize: each node in its own community
    let mut community: Vec<u32> = (0..n as u32).collect();

    if total_weight > 0.0 {
        let mut comm_total_strength: HashMap<u32, f64> = HashMap::with_capacity(n);
        for (i, &ki) in node_strengths.iter().enumerate() {
            *comm_total_strength.entry(community[i]).or_default() += ki;
        }

        let m2 = 2.0 * total_weight;
        let mut improved = true;
        let mut iterations = 0;

        while improved && iterations < max_iterations {
            improved = false;
            iterations += 1;

            for node_idx in 0..n {
                let current_comm = community[node_idx];

                let mut comm_weights: BTreeMap<u32, f64> = BTreeMap::new();
                for &(neighbor, w) in &adj[node_idx] {
                    *comm_weights.entry(community[neighbor]).or_default() += w;
                }

                let w_in_current = comm_weights.get(&current_comm).copied().unwrap_or(0.0);
                let ki = node_strengths[node_idx];

                let sigma_tot_current = comm_total_strength
                    .get(&current_comm)
                    .copied()
                    .unwrap_or(0.0);
                let remove_cost =
                    w_in_current / m2 - resolution * ki * (sigma_tot_current - ki) / (m2 * m2);

                let mut best_comm = current_comm;
                let mut best_gain = 0.0;

                for (&target_comm, &w_to_target) in &comm_weights {
                    if target_comm == current_comm {
                        continue;
                    }
                    let sigma_tot_target = comm_total_strength
                        .get(&target_comm)
                        .copied()
                        .unwrap_or(0.0);
                    let insert_cost =
                        w_to_target / m2 - resolution * ki * sigma_tot_target / (m2 * m2);
                    let gain = insert_cost - remove_cost;

                    if gain > best_gain {
                        best_gain = gain;
                        best_comm = target_comm;
                    }
                }

                if best_comm != current_comm {
                    *comm_total_strength.entry(current_comm).or_default() -= ki;
                    *comm_total_strength.entry(best_comm).or_default() += ki;
                    community[node_idx] = best_comm;
                    improved = true;
                }
            }
        }
    }

    // Renumber communities to be contiguous (0, 1, 2, ...)
    let mut comm_remap: HashMap<u32, u32> = HashMap::new();
    let mut next_id = 0u32;
    for c in &community {
        comm_remap.entry(*c).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
    }
    for c in community.iter_mut() {
        *c = comm_remap[c];
    }

    let mut node_map = HashMap::with_capacity(n);
    let mut comm_members: BTreeMap<u32, Vec<String>> = BTreeMap::new();
    for idx in g.node_indices() {
        let id = g[idx].id.clone();
        let comm_id = community[idx.index()];
        node_map.insert(id.clone(), comm_id);
        comm_members.entry(comm_id).or_default().push(id);
    }

    let communities: Vec<CommunityInfo> = comm_members
        .into_iter()
        .map(|(id, mut members)| {
            members.sort();
            CommunityInfo {
                id,
                size: members.len(),
                members,
            }
        })
        .collect();

    let modularity = compute_modularity(&community, &adj, &node_strengths, total_weight);

    (node_map, communities, modularity)
}

/// Compute Newman's modularity Q for a given community assignment.
fn compute_modularity(
    community: &[u32],
    adj: &[Vec<(usize, f64)>],
    node_strengths: &[f64],
    total_weight: f64,
) -> f64 {
    if total_weight == 0.0 {
        return 0.0;
    }
    let m2 = 2.0 * total_weight;
    let mut q = 0.0;

    for (i, neighbors) in adj.iter().enumerate() {
        for &(j, w) in neighbors {
            if community[i] == community[j] {
                q += w - node_strengths[i] * node_strengths[j] / m2;
            }
        }
    }
    q / m2
}

// ============================================================================
// Score statistics
// ============================================================================

/// Distribution summary of importance scores.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreStats {
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// 75th percentile, linearly interpolated
    pub p75: f64,
}

pub fn score_statistics(scores: &[f64]) -> ScoreStats {
    if scores.is_empty() {
        return ScoreStats::default();
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);

    ScoreStats {
        mean,
        std_dev: variance.sqrt(),
        p75: percentile(&sorted, 0.75),
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = q * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Z multiplier by subgraph size: stricter for larger subgraphs.
pub fn size_tier_z(node_count: usize) -> f64 {
    if node_count < 50 {
        0.5
    } else if node_count < 500 {
        1.0
    } else {
        1.5
    }
}

/// `max(mean + z·σ, p75)`
pub fn importance_threshold(stats: &ScoreStats, node_count: usize) -> f64 {
    (stats.mean + size_tier_z(node_count) * stats.std_dev).max(stats.p75)
}
