//! Single-writer task queue for graph maintenance
//!
//! ## Design
//!
//! One worker drains a FIFO of scope-level tasks:
//! 1. `submit`/`dispatch` with a scope id queues the task. For coalescing kinds
//!    an older task for the same `(scope_id, kind)` that has not started yet is
//!    removed and resolved `Cancelled`
//! 2. The worker pops tasks in order, asks the [`NoteStatusSource`] whether the
//!    scope is still being ingested (`Skipped` if so), then runs the work
//!    through the [`TransactionalExecutor`]
//! 3. Requests without a scope id, or marked note-level, skip the queue and run
//!    on the caller's task
//!
//! The queue and the slot table share one `std::sync::Mutex`, never held
//! across an `.await`. Slots are cleared before the caller is notified.
//!
//! ## Usage
//!
//! ```ignore
//! let scheduler = TaskQueueManager::start(executor, status_board, None);
//! let outcome = scheduler
//!     .submit(TaskRequest::new(TaskKind::Importance, note_id, work).with_scope(course_id))
//!     .await;
//! ```

mod slots;
pub mod status;
pub mod task;

pub use status::{NoteStatus, NoteStatusSource, StatusBoard, StatusField};
pub use task::{TaskKind, TaskOutcome, TaskRequest, TaskTicket};

use futures::FutureExt;
use serde_json::Value;
use slots::{Popped, QueueState, QueuedTask, SlotKey};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{EventEmitter, TaskEvent, TaskState};
use crate::executor::{TransactionWork, TransactionalExecutor};

const SHUT_DOWN_MESSAGE: &str = "scheduler is shut down";

struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
    executor: TransactionalExecutor,
    status: Arc<dyn NoteStatusSource>,
    events: Option<Arc<dyn EventEmitter>>,
    shutdown: CancellationToken,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(
        &self,
        id: Uuid,
        kind: TaskKind,
        scope_id: Option<&str>,
        note_id: &str,
        state: TaskState,
        detail: Option<&str>,
    ) {
        match state {
            TaskState::Failed => tracing::warn!(
                task_id = %id, kind = %kind, scope_id, note_id, state = ?state, detail,
                "Task state changed"
            ),
            _ => tracing::debug!(
                task_id = %id, kind = %kind, scope_id, note_id, state = ?state, detail,
                "Task state changed"
            ),
        }
        if let Some(events) = &self.events {
            let mut event =
                TaskEvent::new(id, kind, scope_id.map(str::to_string), note_id, state);
            if let Some(detail) = detail {
                event = event.with_detail(detail);
            }
            events.emit(event);
        }
    }

    fn emit_outcome(
        &self,
        id: Uuid,
        kind: TaskKind,
        scope_id: Option<&str>,
        note_id: &str,
        outcome: &TaskOutcome,
    ) {
        let (state, detail) = match outcome {
            TaskOutcome::Succeeded(_) => (TaskState::Succeeded, None),
            TaskOutcome::Failed(message) => (TaskState::Failed, Some(message.as_str())),
            TaskOutcome::Skipped => (TaskState::Skipped, None),
            TaskOutcome::Cancelled => (TaskState::Cancelled, None),
        };
        self.emit(id, kind, scope_id, note_id, state, detail);
    }

    /// Run work through the executor, turning errors and panics into outcomes.
    async fn run_work(&self, work: &dyn TransactionWork<Output = Value>) -> TaskOutcome {
        match AssertUnwindSafe(self.executor.execute(work))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => TaskOutcome::Succeeded(value),
            Ok(Err(err)) => TaskOutcome::Failed(err.to_string()),
            Err(panic) => {
                TaskOutcome::Failed(format!("task panicked: {}", panic_message(panic.as_ref())))
            }
        }
    }

    fn cancel_queued(&self, task: QueuedTask) {
        self.emit(
            task.id,
            task.kind,
            Some(&task.scope_id),
            &task.note_id,
            TaskState::Cancelled,
            None,
        );
        let _ = task.reply.send(TaskOutcome::Cancelled);
    }

    async fn run_queued(&self, task: QueuedTask) {
        let QueuedTask {
            id,
            kind,
            scope_id,
            note_id,
            work,
            reply,
        } = task;

        let mut outcome = None;
        if let Some(field) = kind.status_field() {
            match self
                .status
                .sibling_in_progress(&scope_id, &note_id, field)
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        task_id = %id, kind = %kind, scope_id = %scope_id,
                        "Sibling note still ingesting, skipping task"
                    );
                    outcome = Some(TaskOutcome::Skipped);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    task_id = %id, error = %e,
                    "Note status lookup failed, running task anyway"
                ),
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                self.emit(id, kind, Some(&scope_id), &note_id, TaskState::Running, None);
                self.run_work(work.as_ref()).await
            }
        };

        if kind.coalesces() {
            let key = SlotKey {
                scope_id: scope_id.clone(),
                kind,
            };
            self.lock().finish(&key, id);
        }
        self.emit_outcome(id, kind, Some(&scope_id), &note_id, &outcome);
        let _ = reply.send(outcome);
    }

    async fn worker_loop(self: Arc<Self>) {
        tracing::info!("Maintenance worker started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            let next = self.lock().pop();
            match next {
                Some(Popped::Run(task)) => self.run_queued(task).await,
                Some(Popped::Stale(task)) => self.cancel_queued(task),
                None => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }
        tracing::info!("Maintenance worker stopped");
    }
}

/// Coalescing single-writer scheduler. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueueManager {
    inner: Arc<Inner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TaskQueueManager {
    /// Create the scheduler and spawn its worker on the current runtime.
    pub fn start(
        executor: TransactionalExecutor,
        status: Arc<dyn NoteStatusSource>,
        events: Option<Arc<dyn EventEmitter>>,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            executor,
            status,
            events,
            shutdown: CancellationToken::new(),
        });
        let worker = tokio::spawn(inner.clone().worker_loop());
        Self {
            inner,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Submit a request and wait for its terminal outcome.
    pub async fn submit(&self, request: TaskRequest) -> TaskOutcome {
        if request.is_fast_path() {
            return self.run_inline(request).await;
        }
        self.enqueue(request).outcome().await
    }

    /// Submit a request without waiting.
    pub fn dispatch(&self, request: TaskRequest) -> TaskTicket {
        if request.is_fast_path() {
            let (tx, rx) = oneshot::channel();
            let id = Uuid::new_v4();
            let this = self.clone();
            tokio::spawn(async move {
                let outcome = this.run_fast(id, request).await;
                let _ = tx.send(outcome);
            });
            return TaskTicket::new(id, rx);
        }
        self.enqueue(request)
    }

    /// Stop taking tasks off the queue. Submissions are still accepted.
    pub fn pause(&self) {
        self.inner.lock().set_paused(true);
        tracing::info!("Maintenance queue paused");
    }

    pub fn resume(&self) {
        self.inner.lock().set_paused(false);
        self.inner.notify.notify_one();
        tracing::info!("Maintenance queue resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().is_paused()
    }

    /// Queued tasks that have not started.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Stop the worker. Queued tasks resolve `Cancelled`; a running task
    /// finishes first.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained = self.inner.lock().close();
        for task in drained {
            self.inner.cancel_queued(task);
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Maintenance worker terminated abnormally");
            }
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.inner.lock().slot_count()
    }

    async fn run_inline(&self, request: TaskRequest) -> TaskOutcome {
        self.run_fast(Uuid::new_v4(), request).await
    }

    async fn run_fast(&self, id: Uuid, request: TaskRequest) -> TaskOutcome {
        let TaskRequest {
            kind,
            scope_id,
            note_id,
            work,
            ..
        } = request;
        let inner = &self.inner;
        let scope = scope_id.as_deref();

        if inner.shutdown.is_cancelled() {
            let outcome = TaskOutcome::Failed(SHUT_DOWN_MESSAGE.into());
            inner.emit_outcome(id, kind, scope, &note_id, &outcome);
            return outcome;
        }
        inner.emit(id, kind, scope, &note_id, TaskState::Submitted, None);
        inner.emit(id, kind, scope, &note_id, TaskState::Running, None);
        let outcome = inner.run_work(work.as_ref()).await;
        inner.emit_outcome(id, kind, scope, &note_id, &outcome);
        outcome
    }

    fn enqueue(&self, request: TaskRequest) -> TaskTicket {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let inner = &self.inner;

        let task = QueuedTask {
            id,
            kind: request.kind,
            scope_id: request.scope_id.unwrap_or_default(),
            note_id: request.note_id,
            work: request.work,
            reply: tx,
        };
        // Reported before the task becomes visible to the worker
        inner.emit(
            id,
            task.kind,
            Some(&task.scope_id),
            &task.note_id,
            TaskState::Submitted,
            None,
        );

        let result = inner.lock().enqueue(task);
        match result {
            Ok(superseded) => {
                if let Some(old) = superseded {
                    tracing::info!(
                        task_id = %old.id, kind = %old.kind, scope_id = %old.scope_id,
                        superseded_by = %id,
                        "Pending task superseded by a newer submission"
                    );
                    inner.cancel_queued(old);
                }
                inner.notify.notify_one();
            }
            Err(rejected) => {
                let outcome = TaskOutcome::Failed(SHUT_DOWN_MESSAGE.into());
                inner.emit_outcome(
                    rejected.id,
                    rejected.kind,
                    Some(&rejected.scope_id),
                    &rejected.note_id,
                    &outcome,
                );
                let _ = rejected.reply.send(outcome);
            }
        }
        TaskTicket::new(id, rx)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
