//! Periodic eviction of old terminal task records.
//!
//! Spawns a background task that drops records which reached a terminal
//! status more than the configured retention ago. Runs on a fixed interval
//! using `tokio::time::interval` until its cancellation token fires.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::queue::TaskQueue;

/// How long [`CleanupHandle::shutdown`] waits for the loop to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Run the cleanup loop until `cancel` is triggered.
///
/// The first sweep happens immediately.
pub async fn run(
    queue: TaskQueue,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = interval.as_secs(),
        "Task cleanup job started"
    );

    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task cleanup job stopping");
                break;
            }
            _ = interval.tick() => {
                let evicted = queue.cleanup(retention);
                if evicted > 0 {
                    tracing::info!(evicted, "Task cleanup: evicted old tasks");
                } else {
                    tracing::debug!("Task cleanup: nothing to evict");
                }
            }
        }
    }
}

/// A running cleanup loop.
pub struct CleanupHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    /// Stop the loop and wait briefly for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.handle).await.is_err() {
            tracing::warn!("Task cleanup job did not stop in time");
        }
    }
}

/// Spawn [`run`] on the current runtime with the configured cadence.
pub fn spawn(queue: TaskQueue, config: &QueueConfig) -> CleanupHandle {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run(
        queue,
        config.retention,
        config.cleanup_interval,
        cancel.clone(),
    ));
    CleanupHandle { cancel, handle }
}
