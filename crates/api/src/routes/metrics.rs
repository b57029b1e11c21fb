use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use taskcast_worker::QueueStats;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: f64,
    pub queue: QueueMetrics,
}

/// Condensed queue counts: waiting and running tasks are reported together.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct QueueMetrics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl From<QueueStats> for QueueMetrics {
    fn from(stats: QueueStats) -> Self {
        Self {
            total: stats.total,
            active: stats.pending + stats.processing,
            completed: stats.completed,
            failed: stats.failed,
            timed_out: stats.timed_out,
            cancelled: stats.cancelled,
        }
    }
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_seconds: state.uptime_seconds(),
        queue: state.queue.stats().into(),
    })
}

/// Mount the metrics route (root-level).
pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}
