pub mod health;
pub mod metrics;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /tasks                   list by owner
/// /tasks/stats             per-status counts
/// /tasks/{id}              get
/// /tasks/{id}/cancel       cancel (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/tasks", tasks::router())
}
