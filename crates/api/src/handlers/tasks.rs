//! Handlers for the `/tasks` resource.
//!
//! Submission happens in-process through [`TaskQueue::submit`]; over HTTP
//! tasks can only be read, listed, and cancelled.
//!
//! [`TaskQueue::submit`]: taskcast_worker::TaskQueue::submit

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskcast_core::error::CoreError;
use taskcast_core::task::TaskRecord;
use taskcast_core::types::{OwnerId, TaskId};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A task record plus its live completion estimate.
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub record: TaskRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_seconds: Option<i64>,
}

impl From<TaskRecord> for TaskView {
    fn from(record: TaskRecord) -> Self {
        let estimated_remaining_seconds = record.estimated_remaining_secs(Utc::now());
        Self {
            record,
            estimated_remaining_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub owner_id: OwnerId,
    /// Include finished tasks (default: `true`).
    pub include_terminal: Option<bool>,
}

fn task_not_found(task_id: TaskId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Task",
        id: task_id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .queue
        .get(task_id)
        .ok_or_else(|| task_not_found(task_id))?;
    Ok(Json(DataResponse {
        data: TaskView::from(record),
    }))
}

/// GET /api/v1/tasks?owner_id=&include_terminal=
///
/// Newest first.
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    let tasks: Vec<TaskView> = state
        .queue
        .list_for_owner(params.owner_id, params.include_terminal.unwrap_or(true))
        .into_iter()
        .map(TaskView::from)
        .collect();
    Ok(Json(DataResponse { data: tasks }))
}

/// GET /api/v1/tasks/stats
pub async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(DataResponse {
        data: state.queue.stats(),
    })
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/tasks/{id}/cancel
///
/// Returns 204 on success, 409 if the task already finished. A running
/// call is not interrupted; only its record changes.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
) -> AppResult<impl IntoResponse> {
    if state.queue.get(task_id).is_none() {
        return Err(task_not_found(task_id));
    }

    if !state.queue.cancel(task_id) {
        return Err(AppError::Core(CoreError::Conflict(
            "Task is already in a terminal state and cannot be cancelled".into(),
        )));
    }

    tracing::info!(task_id = %task_id, "Task cancelled via API");
    Ok(StatusCode::NO_CONTENT)
}
