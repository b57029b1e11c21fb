use std::sync::Arc;
use std::time::Instant;

use taskcast_events::{ConnectionRegistry, Notifier};
use taskcast_worker::TaskQueue;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc` or is a handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Task execution engine.
    pub queue: TaskQueue,
    /// Live WebSocket connections, keyed by owner.
    pub connections: Arc<ConnectionRegistry>,
    /// Pushes task messages to an owner's connections.
    pub notifier: Notifier,
    /// When the process started serving, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, queue: TaskQueue, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            notifier: Notifier::new(Arc::clone(&connections)),
            connections,
            started_at: Instant::now(),
        }
    }

    /// Seconds since start-up, rounded to hundredths.
    pub fn uptime_seconds(&self) -> f64 {
        (self.started_at.elapsed().as_secs_f64() * 100.0).round() / 100.0
    }
}
