//! In-process task event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`TaskEventBus`] carries a snapshot of a task record every time the
//! registry accepts a transition. It is designed to be shared via
//! `Arc<TaskEventBus>` between the task queue (publisher) and the
//! notification relay (subscriber).

use chrono::Utc;
use serde::Serialize;
use taskcast_core::task::TaskRecord;
use taskcast_core::types::Timestamp;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

/// What happened to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Submitted,
    Started,
    Progress,
    /// Reached a terminal status; the record says which one.
    Finished,
}

/// A task lifecycle change, carrying the record as it was right after it.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub kind: TaskEventKind,
    pub record: TaskRecord,
    pub timestamp: Timestamp,
}

impl TaskEvent {
    pub fn new(kind: TaskEventKind, record: TaskRecord) -> Self {
        Self {
            kind,
            record,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`TaskEvent`]s.
pub struct TaskEventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl TaskEventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Without subscribers the event is silently dropped.
    pub fn publish(&self, event: TaskEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TaskEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
