//! Entity resolution engine: find, adjudicate and merge duplicate concepts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::adjudicator::{sanitize_groups, Adjudicator, MergeGroup};
use super::grouping::close_pairs;
use super::lexical::{inflection_root, lexically_close};
use super::merge::{apply_merge, plan_merge};
use super::ResolutionConfig;
use crate::neo4j::{GraphTxn, Scope, StoreError};

/// Outcome of one resolution run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub concepts_scanned: usize,
    pub candidate_groups: usize,
    /// Groups merged by the inflection rule
    pub easy_merges: usize,
    /// Groups merged after adjudication
    pub adjudicated_merges: usize,
    /// Concepts deleted into a survivor
    pub absorbed: usize,
    /// Groups skipped because their data changed under the run
    pub failed_groups: usize,
    pub groups: Vec<MergeGroup>,
    pub computation_ms: u64,
}

/// Finds duplicate concepts in a scope and rewrites each group into one node.
#[derive(Clone)]
pub struct EntityResolutionEngine {
    config: ResolutionConfig,
    adjudicator: Arc<dyn Adjudicator>,
}

impl EntityResolutionEngine {
    pub fn new(config: ResolutionConfig, adjudicator: Arc<dyn Adjudicator>) -> Self {
        Self {
            config,
            adjudicator,
        }
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Candidate duplicate groups of the scope (steps 1-3).
    pub async fn candidate_groups(
        &self,
        txn: &mut dyn GraphTxn,
        scope: &Scope,
    ) -> Result<(usize, Vec<Vec<String>>), StoreError> {
        let concepts = txn.concepts_with_embeddings(scope).await?;
        let mut pairs = Vec::new();
        for concept in &concepts {
            let hits = txn
                .nearest_concepts(concept, self.config.top_k, scope)
                .await?;
            for hit in hits {
                if hit.similarity > self.config.similarity_cutoff
                    && lexically_close(&concept.id, &hit.id, self.config.max_edit_distance)
                {
                    pairs.push((concept.id.clone(), hit.id));
                }
            }
        }
        Ok((concepts.len(), close_pairs(&pairs)))
    }

    /// Split candidates into inflection merges and groups needing adjudication.
    pub fn split_easy(candidates: Vec<Vec<String>>) -> (Vec<MergeGroup>, Vec<Vec<String>>) {
        let mut easy = Vec::new();
        let mut ambiguous = Vec::new();
        for group in candidates {
            let root = match group.as_slice() {
                [a, b] => inflection_root(a, b).map(str::to_string),
                _ => None,
            };
            match root {
                Some(canonical) => easy.push(MergeGroup {
                    canonical,
                    members: group,
                }),
                None => ambiguous.push(group),
            }
        }
        (easy, ambiguous)
    }

    /// Run entity resolution for `scope` inside `txn`.
    pub async fn resolve(
        &self,
        txn: &mut dyn GraphTxn,
        scope: &Scope,
    ) -> Result<MergeReport, StoreError> {
        let start = Instant::now();
        let (concepts_scanned, candidates) = self.candidate_groups(txn, scope).await?;
        let candidate_groups = candidates.len();
        let (easy, ambiguous) = Self::split_easy(candidates);

        let adjudicated = if ambiguous.is_empty() {
            Vec::new()
        } else {
            match self.adjudicator.adjudicate(&ambiguous).await {
                Ok(groups) => sanitize_groups(&ambiguous, groups),
                Err(e) => {
                    tracing::warn!(
                        scope = %scope,
                        groups = ambiguous.len(),
                        error = %e,
                        "Adjudication failed, keeping only inflection merges"
                    );
                    Vec::new()
                }
            }
        };

        let mut report = MergeReport {
            concepts_scanned,
            candidate_groups,
            ..Default::default()
        };

        let easy_count = easy.len();
        for (i, group) in easy.into_iter().chain(adjudicated).enumerate() {
            let plan = match plan_merge(txn, &group).await {
                Ok(plan) => plan,
                Err(e) if e.is_domain() => {
                    tracing::warn!(
                        scope = %scope,
                        canonical = %group.canonical,
                        error = %e,
                        "Skipping merge group"
                    );
                    report.failed_groups += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            report.absorbed += apply_merge(txn, &plan).await?;
            if i < easy_count {
                report.easy_merges += 1;
            } else {
                report.adjudicated_merges += 1;
            }
            report.groups.push(group);
        }

        report.computation_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            scope = %scope,
            scanned = report.concepts_scanned,
            candidates = report.candidate_groups,
            easy = report.easy_merges,
            adjudicated = report.adjudicated_merges,
            absorbed = report.absorbed,
            failed = report.failed_groups,
            "Entity resolution finished"
        );
        Ok(report)
    }
}
