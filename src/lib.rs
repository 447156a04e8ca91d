//! Graph Maintenance
//!
//! Keeps derived structure of a multi-tenant concept graph consistent while
//! notes are ingested concurrently:
//! - a single-writer task queue that coalesces redundant per-course jobs
//! - a transactional executor that retries transient store failures
//! - entity resolution (duplicate concept merging)
//! - importance scoring and topic community detection

pub mod events;
pub mod executor;
pub mod graph;
pub mod jobs;
pub mod neo4j;
pub mod resolution;
pub mod scheduler;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use events::{EventBus, EventEmitter};
use executor::{RetryPolicy, TransactionalExecutor};
use graph::{AnalyticsConfig, GraphAnalyticsEngine};
use jobs::GraphMaintenance;
use resolution::{
    Adjudicator, EntityResolutionEngine, HttpAdjudicator, ResolutionConfig, RuleAdjudicator,
};
use scheduler::{StatusBoard, TaskQueueManager};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub neo4j: Neo4jYamlConfig,
    pub scheduler: SchedulerYamlConfig,
    pub resolution: ResolutionConfig,
    pub analytics: AnalyticsConfig,
    pub adjudicator: AdjudicatorYamlConfig,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Dimension of `Concept.embedding`, used when creating the vector index
    pub embedding_dimensions: usize,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
            embedding_dimensions: 768,
        }
    }
}

/// Scheduler and retry configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerYamlConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Capacity of the task event broadcast channel
    pub event_capacity: usize,
}

impl Default for SchedulerYamlConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            event_capacity: 1024,
        }
    }
}

/// Adjudicator configuration section. Without a URL the rule-based
/// adjudicator is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdjudicatorYamlConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AdjudicatorYamlConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub embedding_dimensions: usize,
    pub retry: RetryPolicy,
    pub event_capacity: usize,
    pub resolution: ResolutionConfig,
    pub analytics: AnalyticsConfig,
    pub adjudicator_url: Option<String>,
    pub adjudicator_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let max_attempts = match std::env::var("MAINTENANCE_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid MAINTENANCE_MAX_ATTEMPTS: {raw}"))?,
            Err(_) => yaml.scheduler.max_attempts,
        };

        Ok(Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            embedding_dimensions: yaml.neo4j.embedding_dimensions,
            retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(yaml.scheduler.base_delay_ms),
                Duration::from_millis(yaml.scheduler.max_delay_ms),
            ),
            event_capacity: yaml.scheduler.event_capacity.max(1),
            resolution: yaml.resolution,
            analytics: yaml.analytics,
            adjudicator_url: std::env::var("ADJUDICATOR_URL")
                .ok()
                .filter(|url| !url.is_empty())
                .or(yaml.adjudicator.url),
            adjudicator_timeout: Duration::from_secs(yaml.adjudicator.timeout_secs),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    /// Adjudicator selected by the configuration.
    pub fn adjudicator(&self) -> Result<Arc<dyn Adjudicator>> {
        Ok(match &self.adjudicator_url {
            Some(url) => {
                tracing::info!(url = %url, "Using HTTP adjudicator");
                Arc::new(HttpAdjudicator::new(url.clone(), self.adjudicator_timeout)?)
            }
            None => Arc::new(RuleAdjudicator::new()),
        })
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn neo4j::GraphStore>,
    pub scheduler: TaskQueueManager,
    pub maintenance: GraphMaintenance,
    pub status: Arc<StatusBoard>,
    pub events: Arc<EventBus>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect to Neo4j and start the scheduler.
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(
            neo4j::client::Neo4jClient::new(
                &config.neo4j_uri,
                &config.neo4j_user,
                &config.neo4j_password,
                config.embedding_dimensions,
            )
            .await?,
        );
        Self::with_store(config, store)
    }

    /// Wire the services around an existing store. Must run inside a Tokio
    /// runtime; the scheduler worker is spawned here.
    pub fn with_store(config: Config, store: Arc<dyn neo4j::GraphStore>) -> Result<Self> {
        // Everything fallible goes before the worker is spawned
        let adjudicator = config.adjudicator()?;
        let events = Arc::new(EventBus::new(config.event_capacity));
        let status = Arc::new(StatusBoard::new());
        let executor = TransactionalExecutor::new(store.clone(), config.retry);
        let scheduler = TaskQueueManager::start(
            executor,
            status.clone(),
            Some(events.clone() as Arc<dyn EventEmitter>),
        );
        let maintenance = GraphMaintenance::new(
            scheduler.clone(),
            EntityResolutionEngine::new(config.resolution.clone(), adjudicator),
            GraphAnalyticsEngine::new(config.analytics.clone()),
        );

        Ok(Self {
            store,
            scheduler,
            maintenance,
            status,
            events,
            config: Arc::new(config),
        })
    }

    /// Stop the scheduler, cancelling queued work.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
