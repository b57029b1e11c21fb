//! Real-time notification messages pushed to a task owner's connections.
//!
//! Serialized shape:
//!
//! ```json
//! { "type": "task_update", "task_id": "...", "data": { "status": "processing", ... } }
//! ```

use serde::{Deserialize, Serialize};

use crate::status::TaskStatus;
use crate::task::TaskRecord;
use crate::types::{DbId, TaskId, Timestamp};

/// Periodic progress update.
pub const MSG_TYPE_TASK_UPDATE: &str = "task_update";

/// Task completed successfully.
pub const MSG_TYPE_TASK_COMPLETE: &str = "task_complete";

/// Task failed or ran out of time.
pub const MSG_TYPE_TASK_FAILED: &str = "task_failed";

/// Identifies the task a message is about.
///
/// Queue-held tasks are addressed by UUID; the durable store addresses its
/// generation records by numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Record(DbId),
    Queued(TaskId),
}

impl From<DbId> for TaskRef {
    fn from(id: DbId) -> Self {
        TaskRef::Record(id)
    }
}

impl From<TaskId> for TaskRef {
    fn from(id: TaskId) -> Self {
        TaskRef::Queued(id)
    }
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskRef::Record(id) => write!(f, "{id}"),
            TaskRef::Queued(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_seconds: Option<i64>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub status: TaskStatus,
    pub progress: u8,
    /// Reference to the produced artifact (URL, storage key, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPayload {
    pub status: TaskStatus,
    pub progress: u8,
    pub error: String,
    pub updated_at: Timestamp,
}

/// A message for a task owner, one variant per message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskMessage {
    TaskUpdate {
        task_id: TaskRef,
        data: UpdatePayload,
    },
    TaskComplete {
        task_id: TaskRef,
        data: CompletePayload,
    },
    TaskFailed {
        task_id: TaskRef,
        data: FailedPayload,
    },
}

impl TaskMessage {
    pub fn update(
        task_id: impl Into<TaskRef>,
        status: TaskStatus,
        progress: u8,
        estimated_remaining_seconds: Option<i64>,
        updated_at: Timestamp,
    ) -> Self {
        TaskMessage::TaskUpdate {
            task_id: task_id.into(),
            data: UpdatePayload {
                status,
                progress,
                estimated_remaining_seconds,
                updated_at,
            },
        }
    }

    pub fn complete(
        task_id: impl Into<TaskRef>,
        result_ref: Option<serde_json::Value>,
        elapsed_seconds: Option<f64>,
        updated_at: Timestamp,
    ) -> Self {
        TaskMessage::TaskComplete {
            task_id: task_id.into(),
            data: CompletePayload {
                status: TaskStatus::Completed,
                progress: crate::task::COMPLETE_PROGRESS,
                result_ref,
                elapsed_seconds,
                updated_at,
            },
        }
    }

    pub fn failed(
        task_id: impl Into<TaskRef>,
        status: TaskStatus,
        progress: u8,
        error: impl Into<String>,
        updated_at: Timestamp,
    ) -> Self {
        TaskMessage::TaskFailed {
            task_id: task_id.into(),
            data: FailedPayload {
                status,
                progress,
                error: error.into(),
                updated_at,
            },
        }
    }

    /// Build the message describing the record's current state.
    ///
    /// `Completed` maps to a completion message, `Failed`/`TimedOut` to a
    /// failure message; everything else (including `Cancelled`) is a plain
    /// status update.
    pub fn for_record(record: &TaskRecord, now: Timestamp) -> Self {
        let updated_at = record.completed_at.unwrap_or(now);
        match record.status {
            TaskStatus::Completed => TaskMessage::complete(
                record.id,
                record.result.clone(),
                Some(record.elapsed_seconds(now)),
                updated_at,
            ),
            TaskStatus::Failed | TaskStatus::TimedOut => TaskMessage::failed(
                record.id,
                record.status,
                record.progress,
                record
                    .error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
                updated_at,
            ),
            TaskStatus::Pending | TaskStatus::Processing | TaskStatus::Cancelled => {
                TaskMessage::update(
                    record.id,
                    record.status,
                    record.progress,
                    record.estimated_remaining_secs(now),
                    updated_at,
                )
            }
        }
    }

    /// Wire discriminant of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskMessage::TaskUpdate { .. } => MSG_TYPE_TASK_UPDATE,
            TaskMessage::TaskComplete { .. } => MSG_TYPE_TASK_COMPLETE,
            TaskMessage::TaskFailed { .. } => MSG_TYPE_TASK_FAILED,
        }
    }

    pub fn task_id(&self) -> TaskRef {
        match self {
            TaskMessage::TaskUpdate { task_id, .. }
            | TaskMessage::TaskComplete { task_id, .. }
            | TaskMessage::TaskFailed { task_id, .. } => *task_id,
        }
    }
}
