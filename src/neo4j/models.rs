//! Graph models shared by the store, the resolution engine and the analytics engine

use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Property map of a node or relationship, as JSON values.
pub type PropertyMap = serde_json::Map<String, serde_json::Value>;

/// List-valued properties that record which tenants own a concept.
pub const SCOPING_LIST_KEYS: [&str; 3] = ["user_ids", "note_ids", "course_ids"];

/// Alias list kept on merged concepts.
pub const ALIASES_KEY: &str = "aliases";

// ============================================================================
// Scope
// ============================================================================

/// Level a scope identifier refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Course,
    Note,
}

impl ScopeType {
    /// Node property listing the scope ids a node belongs to.
    pub fn membership_key(self) -> &'static str {
        match self {
            Self::Course => "course_ids",
            Self::Note => "note_ids",
        }
    }
}

impl std::fmt::Display for ScopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Course => write!(f, "course"),
            Self::Note => write!(f, "note"),
        }
    }
}

/// The subgraph a maintenance job operates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub scope_type: ScopeType,
    pub id: String,
}

impl Scope {
    pub fn course(id: impl Into<String>) -> Self {
        Self {
            scope_type: ScopeType::Course,
            id: id.into(),
        }
    }

    pub fn note(id: impl Into<String>) -> Self {
        Self {
            scope_type: ScopeType::Note,
            id: id.into(),
        }
    }

    /// Scope-qualified node attribute, e.g. `course_c42_pagerank`.
    ///
    /// The id is escaped into a Cypher-safe key without losing information:
    /// ASCII letters and digits are kept, `_` becomes `__` and any other
    /// character becomes `_x{hex}_`. Distinct ids always give distinct names.
    pub fn attribute(&self, suffix: &str) -> String {
        let mut id = String::with_capacity(self.id.len());
        for c in self.id.chars() {
            match c {
                c if c.is_ascii_alphanumeric() => id.push(c),
                '_' => id.push_str("__"),
                c => id.push_str(&format!("_x{:x}_", c as u32)),
            }
        }
        format!("{}_{}_{}", self.scope_type, id, suffix)
    }

    pub fn pagerank_attribute(&self) -> String {
        self.attribute("pagerank")
    }

    pub fn community_attribute(&self) -> String {
        self.attribute("community")
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope_type, self.id)
    }
}

// ============================================================================
// Records returned by the store
// ============================================================================

/// A concept carrying an embedding, as seen by entity resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: String,
    /// Sorted label set (always contains `Concept`)
    pub labels: Vec<String>,
    pub embedding: Vec<f32>,
}

/// A vector-search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarConcept {
    pub id: String,
    /// Normalised cosine similarity in `[0, 1]`
    pub similarity: f64,
}

/// Direction of a relationship relative to the concept it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelDirection {
    Outgoing,
    Incoming,
}

/// A relationship incident on a concept, detached from that concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRelationship {
    pub rel_type: String,
    pub direction: RelDirection,
    /// Store-level identifier of the node at the other end
    pub other_element_id: String,
    /// Concept id of the other end, when the other end is a concept
    pub other_concept_id: Option<String>,
    pub properties: PropertyMap,
}

/// Concepts and concept–concept edges restricted to one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopedSubgraph {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

/// A chunk supporting a concept, ranked by how many scoped concepts it mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: String,
    pub text: String,
    pub concept_count: usize,
}

/// Value written into a scope-qualified node attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Float(f64),
    Integer(i64),
}

impl From<AttributeValue> for serde_json::Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::Float(f) => serde_json::json!(f),
            AttributeValue::Integer(i) => serde_json::json!(i),
        }
    }
}

// ============================================================================
// Identifier validation for templated Cypher
// ============================================================================

/// Validate a property key or relationship type before it is spliced into Cypher.
///
/// Only ASCII letters, digits and `_` are accepted, and the first character
/// must not be a digit.
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
