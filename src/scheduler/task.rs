//! Task requests, outcomes and tickets

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::status::StatusField;
use crate::executor::TransactionWork;

/// What a task does. Decides coalescing and skip behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Merge,
    Importance,
    Community,
    /// Arbitrary work: queued in order, never coalesced or skipped
    AdHoc,
}

impl TaskKind {
    /// Whether a newer submission for the same scope replaces a pending one.
    pub fn coalesces(self) -> bool {
        !matches!(self, Self::AdHoc)
    }

    /// Ingestion status that must be settled on sibling notes before running.
    pub fn status_field(self) -> Option<StatusField> {
        match self {
            Self::Merge => Some(StatusField::Embedding),
            Self::Importance | Self::Community => Some(StatusField::GraphExtraction),
            Self::AdHoc => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Importance => write!(f, "importance"),
            Self::Community => write!(f, "community"),
            Self::AdHoc => write!(f, "ad_hoc"),
        }
    }
}

/// Terminal result of a task, delivered once through its result channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded(Value),
    Failed(String),
    /// Another note of the scope was still being ingested
    Skipped,
    /// Superseded by a newer submission, or dropped at shutdown
    Cancelled,
}

impl TaskOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Succeeded(value) => Some(value),
            _ => None,
        }
    }
}

/// Work submitted to the scheduler.
pub struct TaskRequest {
    pub kind: TaskKind,
    pub scope_id: Option<String>,
    pub note_id: String,
    /// Run immediately on the caller's task even when a scope id is present
    pub note_level: bool,
    pub(crate) work: Box<dyn TransactionWork<Output = Value>>,
}

impl TaskRequest {
    pub fn new<W>(kind: TaskKind, note_id: impl Into<String>, work: W) -> Self
    where
        W: TransactionWork<Output = Value> + 'static,
    {
        Self {
            kind,
            scope_id: None,
            note_id: note_id.into(),
            note_level: false,
            work: Box::new(work),
        }
    }

    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn note_level(mut self) -> Self {
        self.note_level = true;
        self
    }

    /// Requests that bypass the queue.
    pub fn is_fast_path(&self) -> bool {
        self.scope_id.is_none() || self.note_level
    }
}

impl std::fmt::Debug for TaskRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRequest")
            .field("kind", &self.kind)
            .field("scope_id", &self.scope_id)
            .field("note_id", &self.note_id)
            .field("note_level", &self.note_level)
            .finish_non_exhaustive()
    }
}

/// Handle on a dispatched task.
#[derive(Debug)]
pub struct TaskTicket {
    pub id: Uuid,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskTicket {
    pub(crate) fn new(id: Uuid, rx: oneshot::Receiver<TaskOutcome>) -> Self {
        Self { id, rx }
    }

    /// Wait for the task to reach a terminal state.
    pub async fn outcome(self) -> TaskOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| TaskOutcome::Failed("task dropped before completion".into()))
    }
}
