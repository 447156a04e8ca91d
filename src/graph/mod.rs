//! Graph analytics engine.
//!
//! In-process graph data science on the scoped concept subgraph using
//! petgraph: PageRank-based importance scoring and Louvain community
//! detection.
//!
//! ## Architecture
//!
//! ```text
//! GraphTxn ──► extraction ──► ConceptGraph
//!                                  │
//!                  ┌───────────────┴───────────────┐
//!              pagerank                   projection (catalog)
//!           + score statistics                     │
//!                  │                            louvain
//!                  └───────────────┬───────────────┘
//!                                  │
//!                     write_attribute ──► GraphTxn
//! ```
//!
//! ## Modules
//!
//! - [`models`] - Data structures (ConceptGraph, reports, AnalyticsConfig)
//! - [`algorithms`] - PageRank, Louvain, score statistics
//! - [`extraction`] - scoped subgraph → petgraph conversion
//! - [`projection`] - named ephemeral projections with RAII teardown
//! - [`engine`] - `GraphAnalyticsEngine` orchestrator

pub mod algorithms;
pub mod engine;
pub mod extraction;
pub mod models;
pub mod projection;

pub use engine::GraphAnalyticsEngine;
pub use models::{
    AnalyticsConfig, CommunityInfo, CommunityReport, ConceptEdge, ConceptGraph, ConceptNode,
    ImportanceReport, ImportantConcept,
};
pub use projection::{ProjectionCatalog, ProjectionGuard};
