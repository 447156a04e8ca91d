//! FIFO queue and per-scope slot table, mutated together under one lock

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::task::{TaskKind, TaskOutcome};
use crate::executor::TransactionWork;

/// Coalescing key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SlotKey {
    pub scope_id: String,
    pub kind: TaskKind,
}

/// Occupants of one key: the latest queued task and the one executing.
#[derive(Debug, Default)]
struct Slot {
    pending: Option<Uuid>,
    running: Option<Uuid>,
}

/// A task waiting in the FIFO.
pub(crate) struct QueuedTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub scope_id: String,
    pub note_id: String,
    pub work: Box<dyn TransactionWork<Output = Value>>,
    pub reply: oneshot::Sender<TaskOutcome>,
}

impl QueuedTask {
    pub fn slot_key(&self) -> Option<SlotKey> {
        self.kind.coalesces().then(|| SlotKey {
            scope_id: self.scope_id.clone(),
            kind: self.kind,
        })
    }
}

/// Result of taking the head of the queue.
pub(crate) enum Popped {
    /// Slot now records the task as running
    Run(QueuedTask),
    /// Slot no longer names this task as pending
    Stale(QueuedTask),
}

#[derive(Default)]
pub(crate) struct QueueState {
    queue: VecDeque<QueuedTask>,
    slots: HashMap<SlotKey, Slot>,
    paused: bool,
    closed: bool,
}

impl QueueState {
    /// Append a task. For coalescing kinds the key's pending occupant is
    /// removed from the queue and returned so the caller can cancel it.
    ///
    /// Fails with the task itself once the queue is closed.
    pub fn enqueue(&mut self, task: QueuedTask) -> Result<Option<QueuedTask>, QueuedTask> {
        if self.closed {
            return Err(task);
        }
        let mut superseded = None;
        if let Some(key) = task.slot_key() {
            let slot = self.slots.entry(key).or_default();
            if let Some(old_id) = slot.pending.replace(task.id) {
                if let Some(pos) = self.queue.iter().position(|t| t.id == old_id) {
                    superseded = self.queue.remove(pos);
                }
            }
        }
        self.queue.push_back(task);
        Ok(superseded)
    }

    pub fn pop(&mut self) -> Option<Popped> {
        if self.paused {
            return None;
        }
        let task = self.queue.pop_front()?;
        let Some(key) = task.slot_key() else {
            return Some(Popped::Run(task));
        };
        match self.slots.get_mut(&key) {
            Some(slot) if slot.pending == Some(task.id) => {
                slot.pending = None;
                slot.running = Some(task.id);
                Some(Popped::Run(task))
            }
            _ => Some(Popped::Stale(task)),
        }
    }

    /// Clear the running occupant after a terminal transition.
    pub fn finish(&mut self, key: &SlotKey, id: Uuid) {
        if let Some(slot) = self.slots.get_mut(key) {
            if slot.running == Some(id) {
                slot.running = None;
            }
            if slot.pending.is_none() && slot.running.is_none() {
                self.slots.remove(key);
            }
        }
    }

    /// Stop accepting tasks and hand back everything still queued.
    pub fn close(&mut self) -> Vec<QueuedTask> {
        self.closed = true;
        for slot in self.slots.values_mut() {
            slot.pending = None;
        }
        self.slots.retain(|_, slot| slot.running.is_some());
        self.queue.drain(..).collect()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
