//! Maintenance jobs
//!
//! Transaction bodies for the three maintenance kinds, and [`GraphMaintenance`],
//! the entry point callers use to submit them for a [`Scope`]. Course scopes go
//! through the coalescing queue; note scopes take the fast path.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::executor::TransactionWork;
use crate::graph::GraphAnalyticsEngine;
use crate::neo4j::{GraphTxn, Scope, ScopeType, StoreError};
use crate::resolution::EntityResolutionEngine;
use crate::scheduler::{TaskKind, TaskOutcome, TaskQueueManager, TaskRequest, TaskTicket};

fn to_json<T: Serialize>(report: &T) -> Result<Value, StoreError> {
    serde_json::to_value(report).map_err(|e| StoreError::Other(e.into()))
}

/// Entity resolution for one scope.
pub struct MergeWork {
    engine: EntityResolutionEngine,
    scope: Scope,
}

#[async_trait]
impl TransactionWork for MergeWork {
    type Output = Value;

    async fn run(&self, txn: &mut dyn GraphTxn) -> Result<Value, StoreError> {
        let report = self.engine.resolve(txn, &self.scope).await?;
        to_json(&report)
    }
}

/// Importance scoring for one scope.
pub struct ImportanceWork {
    engine: GraphAnalyticsEngine,
    scope: Scope,
}

#[async_trait]
impl TransactionWork for ImportanceWork {
    type Output = Value;

    async fn run(&self, txn: &mut dyn GraphTxn) -> Result<Value, StoreError> {
        let report = self.engine.compute_importance(txn, &self.scope).await?;
        to_json(&report)
    }
}

/// Community detection for one scope.
pub struct CommunityWork {
    engine: GraphAnalyticsEngine,
    scope: Scope,
}

#[async_trait]
impl TransactionWork for CommunityWork {
    type Output = Value;

    async fn run(&self, txn: &mut dyn GraphTxn) -> Result<Value, StoreError> {
        let report = self.engine.detect_communities(txn, &self.scope).await?;
        to_json(&report)
    }
}

/// Submits maintenance jobs to the scheduler.
#[derive(Clone)]
pub struct GraphMaintenance {
    scheduler: TaskQueueManager,
    resolution: EntityResolutionEngine,
    analytics: GraphAnalyticsEngine,
}

impl GraphMaintenance {
    pub fn new(
        scheduler: TaskQueueManager,
        resolution: EntityResolutionEngine,
        analytics: GraphAnalyticsEngine,
    ) -> Self {
        Self {
            scheduler,
            resolution,
            analytics,
        }
    }

    pub fn scheduler(&self) -> &TaskQueueManager {
        &self.scheduler
    }

    /// Build the request for a maintenance kind. `AdHoc` has no job body.
    pub fn request(
        &self,
        kind: TaskKind,
        scope: &Scope,
        note_id: impl Into<String>,
    ) -> anyhow::Result<TaskRequest> {
        let scope_owned = scope.clone();
        let request = match kind {
            TaskKind::Merge => TaskRequest::new(
                kind,
                note_id,
                MergeWork {
                    engine: self.resolution.clone(),
                    scope: scope_owned,
                },
            ),
            TaskKind::Importance => TaskRequest::new(
                kind,
                note_id,
                ImportanceWork {
                    engine: self.analytics.clone(),
                    scope: scope_owned,
                },
            ),
            TaskKind::Community => TaskRequest::new(
                kind,
                note_id,
                CommunityWork {
                    engine: self.analytics.clone(),
                    scope: scope_owned,
                },
            ),
            TaskKind::AdHoc => anyhow::bail!("ad hoc tasks carry their own work"),
        };
        let request = request.with_scope(scope.id.clone());
        Ok(match scope.scope_type {
            ScopeType::Note => request.note_level(),
            ScopeType::Course => request,
        })
    }

    /// Submit a maintenance job without waiting for it.
    pub fn dispatch(
        &self,
        kind: TaskKind,
        scope: &Scope,
        note_id: impl Into<String>,
    ) -> anyhow::Result<TaskTicket> {
        Ok(self.scheduler.dispatch(self.request(kind, scope, note_id)?))
    }

    async fn submit_job(&self, kind: TaskKind, scope: &Scope, note_id: String) -> TaskOutcome {
        match self.request(kind, scope, note_id) {
            Ok(request) => self.scheduler.submit(request).await,
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }

    /// Merge duplicate concepts of `scope`.
    pub async fn merge_entities(&self, scope: &Scope, note_id: impl Into<String>) -> TaskOutcome {
        self.submit_job(TaskKind::Merge, scope, note_id.into()).await
    }

    /// Score concept importance in `scope`.
    pub async fn compute_importance(
        &self,
        scope: &Scope,
        note_id: impl Into<String>,
    ) -> TaskOutcome {
        self.submit_job(TaskKind::Importance, scope, note_id.into())
            .await
    }

    /// Detect topic communities in `scope`.
    pub async fn detect_communities(
        &self,
        scope: &Scope,
        note_id: impl Into<String>,
    ) -> TaskOutcome {
        self.submit_job(TaskKind::Community, scope, note_id.into())
            .await
    }
}
