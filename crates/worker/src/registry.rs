//! In-memory task registry.
//!
//! Volatile status cache keyed by task id. All reads and writes go through
//! one coarse mutex; callers only ever see snapshots. Every write is
//! checked against [`TaskStatus::can_transition_to`] under that lock, so
//! the first terminal write wins and later ones are rejected.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use taskcast_core::status::TaskStatus;
use taskcast_core::task::{TaskRecord, COMPLETE_PROGRESS, STARTED_PROGRESS};
use taskcast_core::types::{OwnerId, TaskId, Timestamp};

/// A requested status change, with the data it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Processing,
    Completed(serde_json::Value),
    Failed(String),
    TimedOut(String),
    Cancelled,
}

impl Transition {
    /// Status the record ends up in.
    pub fn target(&self) -> TaskStatus {
        match self {
            Transition::Processing => TaskStatus::Processing,
            Transition::Completed(_) => TaskStatus::Completed,
            Transition::Failed(_) => TaskStatus::Failed,
            Transition::TimedOut(_) => TaskStatus::TimedOut,
            Transition::Cancelled => TaskStatus::Cancelled,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransitionError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} cannot move from {from} to {to}")]
    Rejected {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

/// Per-status counts over the whole registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Processing => self.processing,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::TimedOut => self.timed_out,
            TaskStatus::Cancelled => self.cancelled,
        }
    }

    fn record(&mut self, status: TaskStatus) {
        self.total += 1;
        let slot = match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Processing => &mut self.processing,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::TimedOut => &mut self.timed_out,
            TaskStatus::Cancelled => &mut self.cancelled,
        };
        *slot += 1;
    }
}

struct Slot {
    /// Insertion order, breaks `created_at` ties.
    seq: u64,
    record: TaskRecord,
}

#[derive(Default)]
struct State {
    tasks: HashMap<TaskId, Slot>,
    next_seq: u64,
}

#[derive(Default)]
pub struct TaskRegistry {
    state: Mutex<State>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new record and return a snapshot of it.
    pub fn insert(&self, record: TaskRecord) -> TaskRecord {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let snapshot = record.clone();
        state.tasks.insert(record.id, Slot { seq, record });
        snapshot
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.state.lock().tasks.get(&id).map(|slot| slot.record.clone())
    }

    /// All records of `owner_id`, newest first.
    pub fn list_for_owner(&self, owner_id: OwnerId, include_terminal: bool) -> Vec<TaskRecord> {
        let state = self.state.lock();
        let mut owned: Vec<&Slot> = state
            .tasks
            .values()
            .filter(|slot| slot.record.owner_id == owner_id)
            .filter(|slot| include_terminal || !slot.record.is_terminal())
            .collect();
        owned.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        owned.into_iter().map(|slot| slot.record.clone()).collect()
    }

    /// Apply `transition` if the lifecycle allows it from the current status.
    pub fn transition(
        &self,
        id: TaskId,
        transition: Transition,
        now: Timestamp,
    ) -> Result<TaskRecord, TransitionError> {
        let mut state = self.state.lock();
        let record = &mut state
            .tasks
            .get_mut(&id)
            .ok_or(TransitionError::NotFound(id))?
            .record;

        let to = transition.target();
        if !record.status.can_transition_to(to) {
            return Err(TransitionError::Rejected {
                id,
                from: record.status,
                to,
            });
        }

        match transition {
            Transition::Processing => {
                record.started_at = Some(now);
                record.progress = record.progress.max(STARTED_PROGRESS);
            }
            Transition::Completed(value) => {
                record.result = Some(value);
                record.progress = COMPLETE_PROGRESS;
                record.completed_at = Some(now);
            }
            Transition::Failed(message) | Transition::TimedOut(message) => {
                record.error = Some(message);
                record.completed_at = Some(now);
            }
            Transition::Cancelled => {
                record.completed_at = Some(now);
            }
        }
        record.status = to;

        Ok(record.clone())
    }

    /// Raise the progress of an active task.
    ///
    /// Values above 100 are clamped. Returns the updated snapshot, or `None`
    /// when the task is unknown, terminal, or already at least that far.
    pub fn set_progress(&self, id: TaskId, progress: u8) -> Option<TaskRecord> {
        let progress = progress.min(COMPLETE_PROGRESS);
        let mut state = self.state.lock();
        let record = &mut state.tasks.get_mut(&id)?.record;
        if record.is_terminal() || progress <= record.progress {
            return None;
        }
        record.progress = progress;
        Some(record.clone())
    }

    /// Evict terminal records completed at or before `cutoff`.
    ///
    /// Returns the ids of the evicted records.
    pub fn evict_completed_before(&self, cutoff: Timestamp) -> Vec<TaskId> {
        let mut state = self.state.lock();
        let expired: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|slot| slot.record.is_terminal())
            .filter(|slot| slot.record.completed_at.is_some_and(|at| at <= cutoff))
            .map(|slot| slot.record.id)
            .collect();
        for id in &expired {
            state.tasks.remove(id);
        }
        expired
    }

    /// Single-pass aggregate under the lock.
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        let mut stats = QueueStats::default();
        for slot in state.tasks.values() {
            stats.record(slot.record.status);
        }
        stats
    }
}
