//! Asynchronous task execution engine.
//!
//! Accepts blocking work units, runs them on a bounded worker pool under a
//! per-task deadline, and tracks every task's lifecycle in an in-memory
//! registry. Lifecycle changes are published on a
//! [`TaskEventBus`](taskcast_events::TaskEventBus).

pub mod cleanup;
pub mod config;
pub mod deadline;
pub mod pool;
pub mod queue;
pub mod registry;

pub use cleanup::CleanupHandle;
pub use config::{env_or, QueueConfig};
pub use pool::{PoolClosed, WorkerPool, DEFAULT_POOL_SIZE, MAX_POOL_SIZE};
pub use queue::{ProgressReporter, TaskQueue};
pub use registry::{QueueStats, TaskRegistry, Transition, TransitionError};
