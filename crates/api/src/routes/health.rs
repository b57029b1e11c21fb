use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use taskcast_worker::QueueStats;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub uptime_seconds: f64,
    /// Worker pool size.
    pub workers: usize,
    /// Live WebSocket connections across all owners.
    pub connections: usize,
    /// Task counts, total and per status.
    pub queue: QueueStats,
}

/// GET /health -- service status, uptime, and task queue counts.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        workers: state.queue.pool_size(),
        connections: state.connections.total_connections().await,
        queue: state.queue.stats(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
