//! Entity resolution
//!
//! Merges concepts that denote the same entity:
//! 1. vector search proposes near neighbours with the same labels
//! 2. a lexical gate keeps pairs that also look alike
//! 3. pairs are closed transitively into candidate groups
//! 4. two-member groups differing by an inflection merge right away
//! 5. the remaining groups go through an [`Adjudicator`]
//! 6. each resolved group is rewritten into one surviving node

pub mod adjudicator;
pub mod engine;
pub mod grouping;
pub mod lexical;
pub mod merge;

pub use adjudicator::{Adjudicator, HttpAdjudicator, MergeGroup, RuleAdjudicator};
pub use engine::{EntityResolutionEngine, MergeReport};

use serde::{Deserialize, Serialize};

/// Tuning for candidate detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Nearest neighbours fetched per concept (default: 10)
    pub top_k: usize,
    /// Minimum normalised vector similarity, exclusive (default: 0.95)
    pub similarity_cutoff: f64,
    /// Edit distance must be strictly below this (default: 3)
    pub max_edit_distance: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            similarity_cutoff: 0.95,
            max_edit_distance: 3,
        }
    }
}
