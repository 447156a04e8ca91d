//! Task lifecycle event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::TaskKind;

/// Lifecycle state a task moved into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Submitted,
    Cancelled,
    Skipped,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Skipped | Self::Succeeded | Self::Failed
        )
    }
}

/// A task state transition
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub kind: TaskKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    pub note_id: String,
    pub state: TaskState,
    /// Failure message or other detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl TaskEvent {
    /// Create a new TaskEvent with the current timestamp
    pub fn new(
        task_id: Uuid,
        kind: TaskKind,
        scope_id: Option<String>,
        note_id: impl Into<String>,
        state: TaskState,
    ) -> Self {
        Self {
            task_id,
            kind,
            scope_id,
            note_id: note_id.into(),
            state,
            detail: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink for task lifecycle events
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: TaskEvent);
}
