//! Named ephemeral graph projections.
//!
//! Community detection copies the scoped subgraph into a projection, runs on
//! it, then drops it. A [`ProjectionGuard`] owns each projection and removes it
//! from the [`ProjectionCatalog`] when dropped, so an error between projection
//! and release never leaves analysis state behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::models::ConceptGraph;
use crate::neo4j::StoreError;

type Projections = Arc<Mutex<HashMap<String, Arc<ConceptGraph>>>>;

/// Registry of live projections, shared by every clone.
#[derive(Debug, Clone, Default)]
pub struct ProjectionCatalog {
    projections: Projections,
    created: Arc<AtomicUsize>,
}

impl ProjectionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ConceptGraph>>> {
        self.projections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `graph` under `name`. Fails if the name is already live.
    pub fn project(
        &self,
        name: impl Into<String>,
        graph: ConceptGraph,
    ) -> Result<ProjectionGuard, StoreError> {
        let name = name.into();
        let graph = Arc::new(graph);
        {
            let mut projections = self.lock();
            if projections.contains_key(&name) {
                return Err(StoreError::IdentifierTaken(format!("projection {name}")));
            }
            projections.insert(name.clone(), graph.clone());
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            projection = %name,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Created graph projection"
        );
        Ok(ProjectionGuard {
            catalog: self.clone(),
            name,
            graph,
            released: false,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Number of live projections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Projections created since the catalog was built.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }
}

/// Owner of one live projection.
#[derive(Debug)]
pub struct ProjectionGuard {
    catalog: ProjectionCatalog,
    name: String,
    graph: Arc<ConceptGraph>,
    released: bool,
}

impl ProjectionGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// Drop the projection after a successful run.
    pub fn release(mut self) {
        self.released = true;
        if self.catalog.remove(&self.name) {
            tracing::debug!(projection = %self.name, "Dropped graph projection");
        }
    }
}

impl Drop for ProjectionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.catalog.remove(&self.name) {
            tracing::warn!(projection = %self.name, "Tore down graph projection after failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> ConceptGraph {
        let mut g = ConceptGraph::new();
        g.add_node("a");
        g.add_node("b");
        g
    }

    #[test]
    fn test_release_removes_projection() {
        let catalog = ProjectionCatalog::new();
        let guard = catalog.project("course_c1_louvain", small_graph()).unwrap();
        assert!(catalog.contains("course_c1_louvain"));
        assert_eq!(guard.graph().node_count(), 2);
        guard.release();
        assert!(catalog.is_empty());
        assert_eq!(catalog.created_count(), 1);
    }

    #[test]
    fn test_drop_tears_down_projection() {
        let catalog = ProjectionCatalog::new();
        {
            let _guard = catalog.project("p", small_graph()).unwrap();
            assert_eq!(catalog.len(), 1);
        }
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let catalog = ProjectionCatalog::new();
        let _guard = catalog.project("p", small_graph()).unwrap();
        let err = catalog.project("p", small_graph()).unwrap_err();
        assert!(matches!(err, StoreError::IdentifierTaken(_)));
        assert_eq!(catalog.len(), 1);
    }
}
