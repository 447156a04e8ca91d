//! Note ingestion status, consulted by the skip policy

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-note ingestion stage that maintenance tasks depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusField {
    Embedding,
    GraphExtraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl NoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Answers whether other notes of a scope are still being ingested.
#[async_trait]
pub trait NoteStatusSource: Send + Sync {
    /// `true` when a note of `scope_id` other than `note_id` has a
    /// non-terminal status for `field`.
    async fn sibling_in_progress(
        &self,
        scope_id: &str,
        note_id: &str,
        field: StatusField,
    ) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Default)]
struct NoteEntry {
    scope_id: String,
    statuses: HashMap<StatusField, NoteStatus>,
}

/// In-memory status source fed by the ingestion pipeline.
#[derive(Debug, Default)]
pub struct StatusBoard {
    notes: RwLock<HashMap<String, NoteEntry>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status of one field of a note. Re-assigns the note's scope.
    ///
    /// A note whose recorded fields are all terminal is dropped from the
    /// board; for the skip policy an absent note and a finished one are the
    /// same.
    pub async fn set_status(
        &self,
        note_id: &str,
        scope_id: &str,
        field: StatusField,
        status: NoteStatus,
    ) {
        let mut notes = self.notes.write().await;
        let entry = notes.entry(note_id.to_string()).or_default();
        entry.scope_id = scope_id.to_string();
        entry.statuses.insert(field, status);
        if entry.statuses.values().all(|s| s.is_terminal()) {
            notes.remove(note_id);
        }
    }

    /// Number of notes with at least one non-terminal field.
    pub async fn len(&self) -> usize {
        self.notes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notes.read().await.is_empty()
    }

    pub async fn status(&self, note_id: &str, field: StatusField) -> Option<NoteStatus> {
        self.notes
            .read()
            .await
            .get(note_id)
            .and_then(|e| e.statuses.get(&field).copied())
    }

    pub async fn remove_note(&self, note_id: &str) {
        self.notes.write().await.remove(note_id);
    }
}

#[async_trait]
impl NoteStatusSource for StatusBoard {
    async fn sibling_in_progress(
        &self,
        scope_id: &str,
        note_id: &str,
        field: StatusField,
    ) -> anyhow::Result<bool> {
        let notes = self.notes.read().await;
        Ok(notes.iter().any(|(id, entry)| {
            id != note_id
                && entry.scope_id == scope_id
                && entry
                    .statuses
                    .get(&field)
                    .is_some_and(|s| !s.is_terminal())
        }))
    }
}
