//! Builds task notifications and fans them out to the owner's connections.

use std::sync::Arc;

use chrono::Utc;
use taskcast_core::messages::{TaskMessage, TaskRef};
use taskcast_core::status::TaskStatus;
use taskcast_core::task::TaskRecord;
use taskcast_core::types::OwnerId;

use crate::connections::ConnectionRegistry;

/// Stateless front end over [`ConnectionRegistry::send_to_owner`].
///
/// Cheap to clone; every clone shares the same registry.
#[derive(Clone)]
pub struct Notifier {
    connections: Arc<ConnectionRegistry>,
}

impl Notifier {
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Serialize `message` and deliver it to every connection of `owner_id`.
    ///
    /// Returns the number of connections that received it.
    pub async fn send(&self, owner_id: OwnerId, message: &TaskMessage) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(owner_id, error = %e, "Failed to serialize task message");
                return 0;
            }
        };

        let delivered = self.connections.send_to_owner(owner_id, &text).await;
        tracing::debug!(
            owner_id,
            task_id = %message.task_id(),
            kind = message.kind(),
            delivered,
            "Task notification sent",
        );
        delivered
    }

    /// Progress update: status, percentage, optional ETA.
    pub async fn task_update(
        &self,
        owner_id: OwnerId,
        task_id: impl Into<TaskRef>,
        status: TaskStatus,
        progress: u8,
        estimated_remaining_seconds: Option<i64>,
    ) -> usize {
        let message = TaskMessage::update(
            task_id,
            status,
            progress,
            estimated_remaining_seconds,
            Utc::now(),
        );
        self.send(owner_id, &message).await
    }

    /// Completion: artifact reference and elapsed time.
    pub async fn task_complete(
        &self,
        owner_id: OwnerId,
        task_id: impl Into<TaskRef>,
        result_ref: Option<serde_json::Value>,
        elapsed_seconds: Option<f64>,
    ) -> usize {
        let message = TaskMessage::complete(task_id, result_ref, elapsed_seconds, Utc::now());
        self.send(owner_id, &message).await
    }

    /// Failure: error text.
    pub async fn task_failed(
        &self,
        owner_id: OwnerId,
        task_id: impl Into<TaskRef>,
        error: impl Into<String>,
    ) -> usize {
        let message = TaskMessage::failed(task_id, TaskStatus::Failed, 0, error, Utc::now());
        self.send(owner_id, &message).await
    }

    /// Notify the record's owner about the record's current state.
    pub async fn notify_record(&self, record: &TaskRecord) -> usize {
        let message = TaskMessage::for_record(record, Utc::now());
        self.send(record.owner_id, &message).await
    }
}
