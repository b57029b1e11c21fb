//! Bus-to-connection notification relay.
//!
//! [`NotificationRelay`] subscribes to the [`TaskEventBus`](crate::TaskEventBus)
//! and pushes the matching wire message to the task owner for every event.
//! Delivery is decoupled from the task's own state change: a crash between
//! the two leaves the owner un-notified, so clients poll as a fallback.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::TaskEvent;
use crate::notifier::Notifier;

pub struct NotificationRelay {
    notifier: Notifier,
}

impl NotificationRelay {
    pub fn new(notifier: Notifier) -> Self {
        Self { notifier }
    }

    /// Run the relay loop.
    ///
    /// Exits when `cancel` fires or the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<TaskEvent>, cancel: CancellationToken) {
        tracing::info!("Notification relay started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Notification relay shutting down");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) => {
                        self.notifier.notify_record(&event.record).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Notification relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Task event bus closed, notification relay shutting down");
                        break;
                    }
                },
            }
        }
    }
}
