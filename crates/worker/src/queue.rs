//! Asynchronous task queue.
//!
//! Ties together the [`TaskRegistry`], the [`WorkerPool`], and the
//! [deadline supervisor](crate::deadline). Submission returns immediately
//! with a `Pending` snapshot; a Tokio task then waits for a worker slot,
//! runs the work unit on a blocking thread under its deadline, and records
//! the outcome. Every accepted transition is published on the
//! [`TaskEventBus`].
//!
//! Cancellation is bookkeeping only: it flips the record to `Cancelled`
//! but never interrupts a call that is already running. A task cancelled
//! while still waiting for a slot is never started.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskcast_core::status::TaskStatus;
use taskcast_core::task::{describe_budget, TaskRecord};
use taskcast_core::types::{OwnerId, TaskId};
use taskcast_events::{TaskEvent, TaskEventBus, TaskEventKind};
use tokio::runtime::Handle;

use crate::config::QueueConfig;
use crate::deadline::{self, Outcome};
use crate::pool::WorkerPool;
use crate::registry::{QueueStats, TaskRegistry, Transition, TransitionError};

/// A type-erased work unit: blocking, synchronous, one opaque result or an
/// error message.
type WorkUnit = Box<dyn FnOnce(ProgressReporter) -> Result<serde_json::Value, String> + Send>;

struct Shared {
    registry: TaskRegistry,
    pool: WorkerPool,
    bus: Arc<TaskEventBus>,
    runtime: Handle,
}

/// Handle to the task queue. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Create a queue that dispatches on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: &QueueConfig, bus: Arc<TaskEventBus>) -> Self {
        Self::with_runtime(config, bus, Handle::current())
    }

    /// Create a queue that dispatches on `runtime`.
    ///
    /// Submission works from any thread, inside or outside that runtime.
    pub fn with_runtime(config: &QueueConfig, bus: Arc<TaskEventBus>, runtime: Handle) -> Self {
        tracing::info!(pool_size = config.pool_size, "Task queue created");
        Self {
            shared: Arc::new(Shared {
                registry: TaskRegistry::new(),
                pool: WorkerPool::new(config.pool_size),
                bus,
                runtime,
            }),
        }
    }

    /// Submit a work unit and return its `Pending` record without waiting.
    ///
    /// `timeout_budget` is counted from the moment a worker starts the call,
    /// so time spent waiting for a free slot does not count against it.
    pub fn submit<F, T, E>(&self, owner_id: OwnerId, work: F, timeout_budget: Duration) -> TaskRecord
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Into<serde_json::Value>,
        E: std::fmt::Display,
    {
        self.submit_with_progress(owner_id, move |_progress| work(), timeout_budget)
    }

    /// Like [`submit`](Self::submit), but the work unit receives a
    /// [`ProgressReporter`] for intermediate progress.
    pub fn submit_with_progress<F, T, E>(
        &self,
        owner_id: OwnerId,
        work: F,
        timeout_budget: Duration,
    ) -> TaskRecord
    where
        F: FnOnce(ProgressReporter) -> Result<T, E> + Send + 'static,
        T: Into<serde_json::Value>,
        E: std::fmt::Display,
    {
        let record = self
            .shared
            .registry
            .insert(TaskRecord::new(owner_id, timeout_budget, Utc::now()));
        self.shared.publish(TaskEventKind::Submitted, record.clone());

        tracing::info!(
            task_id = %record.id,
            owner_id,
            timeout_secs = timeout_budget.as_secs_f64(),
            "Task submitted"
        );

        let unit: WorkUnit = Box::new(move |progress| {
            work(progress)
                .map(Into::into)
                .map_err(|e| e.to_string())
        });
        self.shared
            .runtime
            .spawn(Shared::execute(Arc::clone(&self.shared), record.id, unit));

        record
    }

    /// Snapshot of one task; `None` for unknown (or evicted) ids.
    pub fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.shared.registry.get(task_id)
    }

    /// Tasks of `owner_id`, newest first.
    pub fn list_for_owner(&self, owner_id: OwnerId, include_terminal: bool) -> Vec<TaskRecord> {
        self.shared.registry.list_for_owner(owner_id, include_terminal)
    }

    /// Mark a `Pending` or `Processing` task as `Cancelled`.
    ///
    /// Returns `false` for unknown or already-terminal tasks, which are left
    /// untouched. A call already running is not interrupted; its eventual
    /// outcome is discarded.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        match self
            .shared
            .registry
            .transition(task_id, Transition::Cancelled, Utc::now())
        {
            Ok(record) => {
                tracing::info!(task_id = %task_id, "Task cancelled");
                self.shared.publish(TaskEventKind::Finished, record);
                true
            }
            Err(e) => {
                tracing::debug!(task_id = %task_id, reason = %e, "Cancel ignored");
                false
            }
        }
    }

    /// Raise the progress of an active task. See [`ProgressReporter::report`].
    pub fn update_progress(&self, task_id: TaskId, progress: u8) -> bool {
        self.shared.update_progress(task_id, progress)
    }

    /// Evict terminal records that completed at least `retention` ago.
    ///
    /// Returns the number of evicted records.
    pub fn cleanup(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let evicted = self.shared.registry.evict_completed_before(cutoff);
        for task_id in &evicted {
            tracing::debug!(task_id = %task_id, "Evicted old task");
        }
        evicted.len()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.registry.stats()
    }

    pub fn pool_size(&self) -> usize {
        self.shared.pool.size()
    }

    /// Stop starting new work.
    ///
    /// Tasks still waiting for a worker slot are cancelled; calls already
    /// running are left to finish and are recorded as usual.
    pub fn shutdown(&self) {
        self.shared.pool.close();
        tracing::info!("Task queue closed to new work");
    }
}

impl Shared {
    /// Per-task execution: wait for a slot, run under the deadline, record.
    async fn execute(self: Arc<Self>, task_id: TaskId, work: WorkUnit) {
        let slot = match self.pool.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Task dropped before start");
                self.finish(task_id, Transition::Cancelled);
                return;
            }
        };

        let record = match self
            .registry
            .transition(task_id, Transition::Processing, Utc::now())
        {
            Ok(record) => record,
            Err(e) => {
                // Cancelled (or evicted) while waiting for the slot.
                tracing::debug!(task_id = %task_id, reason = %e, "Task not started");
                return;
            }
        };
        let budget = record.timeout_budget;
        tracing::info!(task_id = %task_id, "Task started");
        self.publish(TaskEventKind::Started, record);

        let reporter = ProgressReporter {
            shared: Arc::clone(&self),
            task_id,
        };
        let handle = slot.spawn(move || work(reporter));

        let transition = match deadline::supervise(handle, budget).await {
            Outcome::Finished(Ok(value)) => Transition::Completed(value),
            Outcome::Finished(Err(message)) => {
                Transition::Failed(format!("Task execution failed: {message}"))
            }
            Outcome::Panicked(message) => {
                Transition::Failed(format!("Task execution panicked: {message}"))
            }
            Outcome::DeadlineExceeded => Transition::TimedOut(format!(
                "Task timed out after {}",
                describe_budget(budget)
            )),
        };
        self.finish(task_id, transition);
    }

    /// Record a terminal outcome unless the task is already terminal.
    fn finish(&self, task_id: TaskId, transition: Transition) {
        match self.registry.transition(task_id, transition, Utc::now()) {
            Ok(record) => {
                match record.error.as_deref() {
                    None => tracing::info!(task_id = %task_id, status = %record.status, "Task finished"),
                    Some(error) if record.status == TaskStatus::TimedOut => {
                        tracing::warn!(task_id = %task_id, error, "Task timed out")
                    }
                    Some(error) => tracing::error!(task_id = %task_id, error, "Task failed"),
                }
                self.publish(TaskEventKind::Finished, record);
            }
            Err(TransitionError::Rejected { from, to, .. }) => {
                tracing::debug!(
                    task_id = %task_id,
                    current = %from,
                    discarded = %to,
                    "Late outcome discarded"
                );
            }
            Err(TransitionError::NotFound(_)) => {
                tracing::debug!(task_id = %task_id, "Outcome for evicted task discarded");
            }
        }
    }

    fn update_progress(&self, task_id: TaskId, progress: u8) -> bool {
        match self.registry.set_progress(task_id, progress) {
            Some(record) => {
                tracing::debug!(task_id = %task_id, progress = record.progress, "Task progress");
                self.publish(TaskEventKind::Progress, record);
                true
            }
            None => false,
        }
    }

    fn publish(&self, kind: TaskEventKind, record: TaskRecord) {
        self.bus.publish(TaskEvent::new(kind, record));
    }
}

/// Lets a running work unit report intermediate progress.
///
/// Cloneable and usable from any thread.
#[derive(Clone)]
pub struct ProgressReporter {
    shared: Arc<Shared>,
    task_id: TaskId,
}

impl ProgressReporter {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Raise the task's progress to `progress` percent (clamped to 100).
    ///
    /// Returns `false` when nothing changed: the value would not increase
    /// progress, or the task already reached a terminal status (including
    /// cancellation or a deadline that elapsed while this call ran).
    pub fn report(&self, progress: u8) -> bool {
        self.shared.update_progress(self.task_id, progress)
    }
}
