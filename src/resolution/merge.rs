//! Rewriting a merge group into a single concept
//!
//! A merge is planned first (every member read, every relationship type
//! validated, the canonical id checked for collisions) and only then applied.
//! Planning failures caused by the data leave the transaction untouched, so
//! the caller can skip the group and carry on with the next one.

use serde_json::Value;
use std::collections::BTreeSet;

use super::adjudicator::MergeGroup;
use crate::neo4j::{
    validate_identifier, GraphTxn, IncidentRelationship, PropertyMap, StoreError, ALIASES_KEY,
    SCOPING_LIST_KEYS,
};

/// Everything needed to rewrite one group.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub primary: String,
    pub absorbed: Vec<String>,
    pub relationships: Vec<IncidentRelationship>,
    pub properties: PropertyMap,
}

/// Read the group and build its plan without writing anything.
pub async fn plan_merge(
    txn: &mut dyn GraphTxn,
    group: &MergeGroup,
) -> Result<MergePlan, StoreError> {
    let members: Vec<String> = group
        .members
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let Some((primary, absorbed)) = members.split_first() else {
        return Err(StoreError::NotFound("empty merge group".into()));
    };

    let primary_props = txn
        .concept_properties(primary)
        .await?
        .ok_or_else(|| StoreError::NotFound(primary.clone()))?;

    let mut absorbed_props = Vec::with_capacity(absorbed.len());
    for id in absorbed {
        let props = txn
            .concept_properties(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        absorbed_props.push((id.clone(), props));
    }

    if group.canonical != *primary
        && !members.contains(&group.canonical)
        && txn.concept_properties(&group.canonical).await?.is_some()
    {
        return Err(StoreError::IdentifierTaken(group.canonical.clone()));
    }

    let mut relationships = Vec::new();
    for id in absorbed {
        for rel in txn.incident_relationships(id).await? {
            validate_identifier(&rel.rel_type)?;
            let intra_group = rel
                .other_concept_id
                .as_ref()
                .is_some_and(|other| members.contains(other));
            if !intra_group {
                relationships.push(rel);
            }
        }
    }

    Ok(MergePlan {
        primary: primary.clone(),
        absorbed: absorbed.to_vec(),
        relationships,
        properties: merge_properties(primary, &primary_props, &absorbed_props, &group.canonical),
    })
}

/// Apply a plan. Returns the number of absorbed concepts.
pub async fn apply_merge(txn: &mut dyn GraphTxn, plan: &MergePlan) -> Result<usize, StoreError> {
    for rel in &plan.relationships {
        txn.attach_relationship(&plan.primary, rel).await?;
    }
    let deleted = txn.delete_concepts(&plan.absorbed).await?;
    // After the delete, so the survivor may take an absorbed member's id
    txn.replace_concept_properties(&plan.primary, &plan.properties)
        .await?;
    Ok(deleted)
}

/// Combine member properties onto the primary.
///
/// Scoping lists and aliases are unioned; for every other key the primary's
/// value wins, then absorbed members in id order. Absorbed ids become aliases,
/// and so does the primary's own id when it is renamed to `canonical`.
pub fn merge_properties(
    primary: &str,
    primary_props: &PropertyMap,
    absorbed: &[(String, PropertyMap)],
    canonical: &str,
) -> PropertyMap {
    let is_list_key = |k: &str| k == ALIASES_KEY || SCOPING_LIST_KEYS.contains(&k);

    let mut merged = primary_props.clone();
    for (_, props) in absorbed {
        for (key, value) in props {
            if !is_list_key(key.as_str()) {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    for key in SCOPING_LIST_KEYS.iter().copied().chain([ALIASES_KEY]) {
        let mut union: BTreeSet<String> = BTreeSet::new();
        let mut present = false;
        for props in std::iter::once(primary_props).chain(absorbed.iter().map(|(_, p)| p)) {
            if let Some(Value::Array(items)) = props.get(key) {
                present = true;
                union.extend(items.iter().map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }));
            }
        }
        if key == ALIASES_KEY {
            union.extend(absorbed.iter().map(|(id, _)| id.clone()));
            if canonical != primary {
                union.insert(primary.to_string());
            }
            union.remove(canonical);
            present |= !union.is_empty();
        }
        if present {
            merged.insert(
                key.to_string(),
                Value::Array(union.into_iter().map(Value::String).collect()),
            );
        }
    }

    merged.insert("id".into(), Value::String(canonical.to_string()));
    merged
}
