//! Neo4j client and models for the knowledge graph

pub mod client;
pub mod error;
pub mod models;
pub mod traits;

pub use client::Neo4jClient;
pub use error::{ErrorClass, StoreError};
pub use models::*;
pub use traits::{GraphStore, GraphTxn};

#[cfg(test)]
pub(crate) mod mock;
