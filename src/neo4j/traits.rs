//! GraphStore / GraphTxn trait definitions
//!
//! Defines the abstract interface the maintenance jobs use to read and rewrite
//! the knowledge graph. `Neo4jClient` is the production implementation; the
//! in-memory `MockGraphStore` backs the unit tests.

use async_trait::async_trait;

use super::error::StoreError;
use super::models::*;

/// Entry point to the graph store: hands out write transactions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a fresh write transaction.
    async fn begin(&self) -> Result<Box<dyn GraphTxn>, StoreError>;
}

/// A live write transaction.
///
/// Nothing written through a transaction is visible to other transactions
/// until [`GraphTxn::commit`] succeeds. Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait GraphTxn: Send {
    // ========================================================================
    // Entity resolution
    // ========================================================================

    /// All concepts of the scope that carry an embedding vector.
    async fn concepts_with_embeddings(
        &mut self,
        scope: &Scope,
    ) -> Result<Vec<ConceptRecord>, StoreError>;

    /// Top-`k` nearest concepts of the scope sharing `concept`'s label set,
    /// excluding `concept` itself, ordered by descending similarity.
    async fn nearest_concepts(
        &mut self,
        concept: &ConceptRecord,
        k: usize,
        scope: &Scope,
    ) -> Result<Vec<SimilarConcept>, StoreError>;

    /// Properties of a concept, or `None` if it does not exist.
    async fn concept_properties(&mut self, id: &str) -> Result<Option<PropertyMap>, StoreError>;

    /// Relationships attached to a concept.
    async fn incident_relationships(
        &mut self,
        id: &str,
    ) -> Result<Vec<IncidentRelationship>, StoreError>;

    /// Recreate `rel` on the concept `id`, merging with an existing relationship
    /// of the same type and endpoints.
    async fn attach_relationship(
        &mut self,
        id: &str,
        rel: &IncidentRelationship,
    ) -> Result<(), StoreError>;

    /// Replace all properties of a concept (the `id` key renames it).
    async fn replace_concept_properties(
        &mut self,
        id: &str,
        properties: &PropertyMap,
    ) -> Result<(), StoreError>;

    /// Detach-delete concepts. Returns the number of deleted nodes.
    async fn delete_concepts(&mut self, ids: &[String]) -> Result<usize, StoreError>;

    // ========================================================================
    // Analytics
    // ========================================================================

    /// Number of concepts belonging to the scope.
    async fn count_scoped_concepts(&mut self, scope: &Scope) -> Result<usize, StoreError>;

    /// Concepts of the scope and the concept–concept relationships between them.
    async fn scoped_subgraph(&mut self, scope: &Scope) -> Result<ScopedSubgraph, StoreError>;

    /// Chunks of the scope mentioning `concept_id`, ranked by how many distinct
    /// scoped concepts each chunk mentions.
    async fn evidence_chunks(
        &mut self,
        scope: &Scope,
        concept_id: &str,
        limit: usize,
    ) -> Result<Vec<EvidenceChunk>, StoreError>;

    /// Set `attribute` on each listed concept. Returns the number of updated nodes.
    async fn write_attribute(
        &mut self,
        attribute: &str,
        values: &[(String, AttributeValue)],
    ) -> Result<usize, StoreError>;

    // ========================================================================
    // Transaction boundary
    // ========================================================================

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
