//! Bounded pool of blocking worker threads.
//!
//! Work runs on Tokio's blocking thread pool; a semaphore with `size`
//! permits caps how many calls execute at once. A permit travels into the
//! blocking closure and is released only when the call itself returns, so
//! a call abandoned by its deadline keeps occupying its slot until it
//! finishes.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// Default number of concurrently executing work units.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Largest pool a semaphore can back.
pub const MAX_POOL_SIZE: usize = Semaphore::MAX_PERMITS;

#[derive(Debug, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

pub struct WorkerPool {
    slots: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held by a running call.
    pub fn idle(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a free slot.
    ///
    /// Waiters are served in FIFO order. Fails once the pool is closed.
    pub async fn acquire(&self) -> Result<WorkerSlot, PoolClosed> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;
        Ok(WorkerSlot { permit })
    }

    /// Stop handing out slots. Pending `acquire` calls fail; running calls
    /// are unaffected.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

/// The right to run one blocking call.
pub struct WorkerSlot {
    permit: OwnedSemaphorePermit,
}

impl WorkerSlot {
    /// Run `f` on a blocking thread, holding this slot until it returns.
    pub fn spawn<F, R>(self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = self.permit;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
    }
}
