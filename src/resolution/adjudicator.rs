//! Adjudication of ambiguous duplicate groups
//!
//! Candidate groups produced by vector + lexical matching only say that names
//! look alike. An [`Adjudicator`] decides which members actually denote the
//! same referent and under which canonical label.
//!
//! Implementations:
//! - [`RuleAdjudicator`] (default): token identity after normalisation,
//!   ignoring generic qualifiers such as "city" or "inc"
//! - [`HttpAdjudicator`]: delegates to an external classifier over HTTP
//!
//! Configuration via environment variables:
//! - `ADJUDICATOR_URL` (unset: rule-based adjudication)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Duration;

use super::lexical::normalize_name;

/// Members judged to be one entity, and the label the survivor takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub canonical: String,
    pub members: Vec<String>,
}

#[async_trait]
pub trait Adjudicator: Send + Sync {
    /// Split each candidate group into merge groups. Members left out of every
    /// returned group are not merged.
    async fn adjudicate(&self, candidates: &[Vec<String>]) -> Result<Vec<MergeGroup>>;
}

/// Drop groups that reference ids outside their candidate group, reuse an id
/// already claimed by an earlier group, or have fewer than two members.
pub fn sanitize_groups(candidates: &[Vec<String>], groups: Vec<MergeGroup>) -> Vec<MergeGroup> {
    let known: HashSet<&str> = candidates.iter().flatten().map(String::as_str).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for group in groups {
        let canonical = group.canonical.trim().to_string();
        let mut members: Vec<String> = group
            .members
            .into_iter()
            .filter(|m| known.contains(m.as_str()))
            .filter(|m| !claimed.contains(m))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if canonical.is_empty() || members.len() < 2 {
            if !members.is_empty() {
                tracing::debug!(canonical = %canonical, ?members, "Ignoring degenerate merge group");
            }
            continue;
        }
        // A group must stay inside one candidate group
        let home = candidates.iter().find(|c| c.contains(&members[0]));
        if let Some(home) = home {
            if members.iter().any(|m| !home.contains(m)) {
                tracing::warn!(canonical = %canonical, "Merge group spans candidate groups, ignored");
                continue;
            }
        }
        members.sort();
        claimed.extend(members.iter().cloned());
        out.push(MergeGroup { canonical, members });
    }
    out
}

// ============================================================================
// Rule-based
// ============================================================================

/// Tokens that qualify a name without changing its referent.
const QUALIFIER_TOKENS: &[&str] = &[
    "the", "city", "state", "county", "province", "country", "republic", "inc", "corp",
    "corporation", "co", "company", "ltd", "llc", "plc", "group",
];

/// Deterministic adjudicator: two names denote the same entity when their
/// normalised token sets are equal once qualifier tokens are removed.
///
/// "New York" and "New York City" merge; "America" and "American Football"
/// do not.
#[derive(Debug, Clone, Default)]
pub struct RuleAdjudicator;

impl RuleAdjudicator {
    pub fn new() -> Self {
        Self
    }

    fn identity_key(name: &str) -> BTreeSet<String> {
        let normalized = normalize_name(name);
        let all: BTreeSet<String> = normalized.split(' ').map(str::to_string).collect();
        let core: BTreeSet<String> = all
            .iter()
            .filter(|t| !QUALIFIER_TOKENS.contains(&t.as_str()))
            .cloned()
            .collect();
        if core.is_empty() {
            all
        } else {
            core
        }
    }

    /// Shortest normalised name wins; ties go to the smallest id.
    fn pick_canonical(members: &[String]) -> String {
        members
            .iter()
            .min_by(|a, b| {
                normalize_name(a)
                    .chars()
                    .count()
                    .cmp(&normalize_name(b).chars().count())
                    .then_with(|| a.cmp(b))
            })
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Adjudicator for RuleAdjudicator {
    async fn adjudicate(&self, candidates: &[Vec<String>]) -> Result<Vec<MergeGroup>> {
        let mut groups = Vec::new();
        for candidate in candidates {
            let mut by_key: BTreeMap<BTreeSet<String>, Vec<String>> = BTreeMap::new();
            for member in candidate {
                by_key
                    .entry(Self::identity_key(member))
                    .or_default()
                    .push(member.clone());
            }
            for (_, mut members) in by_key {
                if members.len() < 2 {
                    continue;
                }
                members.sort();
                groups.push(MergeGroup {
                    canonical: Self::pick_canonical(&members),
                    members,
                });
            }
        }
        Ok(groups)
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Serialize)]
struct AdjudicationRequest<'a> {
    groups: &'a [Vec<String>],
}

#[derive(Debug, Deserialize)]
struct AdjudicationResponse {
    #[serde(default)]
    groups: Vec<MergeGroup>,
}

/// Adjudicator backed by an external semantic classifier.
///
/// POSTs `{"groups": [["id", ...], ...]}` and expects
/// `{"groups": [{"canonical": "...", "members": ["id", ...]}, ...]}`.
/// Returned groups are sanitized against the candidates.
#[derive(Clone)]
pub struct HttpAdjudicator {
    client: reqwest::Client,
    url: String,
}

impl HttpAdjudicator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        reqwest::Url::parse(&url).with_context(|| format!("Invalid adjudicator URL: {url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Adjudicator for HttpAdjudicator {
    async fn adjudicate(&self, candidates: &[Vec<String>]) -> Result<Vec<MergeGroup>> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(&self.url)
            .json(&AdjudicationRequest { groups: candidates })
            .send()
            .await
            .with_context(|| format!("Failed to connect to adjudicator at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Adjudicator returned {}: {}", status.as_u16(), body);
        }

        let resp: AdjudicationResponse = response
            .json()
            .await
            .context("Failed to parse adjudicator response")?;

        Ok(sanitize_groups(candidates, resp.groups))
    }
}
