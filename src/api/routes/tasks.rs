//! Task command-surface handlers (§4.9): enqueue, pause, resume, cancel,
//! reset, and the three query operations.

use crate::api::AppState;
use crate::types::{Task, TaskId, TaskRecord};
use crate::{Error, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Query parameters shared by the list/finished task queries.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct TaskListQuery {
    /// Restrict to a single group.
    pub group: Option<String>,
}

/// Query parameters for `GET /tasks/finished`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct FinishedTaskQuery {
    /// Restrict to a single group.
    pub group: Option<String>,
    /// Exclude this task id from the result, for a caller that just enqueued
    /// a replacement and doesn't want to see its own predecessor.
    pub ignore_task_id: Option<String>,
}

/// Request body for `POST /tasks/cancel`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CancelRequest {
    /// The task ids to cancel.
    pub task_ids: Vec<TaskId>,
}

/// Request body for `POST /tasks/reset`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ResetRequest {
    /// Restrict the reset to this group; every non-terminal task across all
    /// groups is canceled when omitted.
    pub group: Option<String>,
}

/// Response for `POST /tasks`, `POST /tasks/:id/pause`, and
/// `POST /tasks/:id/resume`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AcceptedResponse {
    /// Whether the command took effect.
    pub accepted: bool,
}

/// Response for `POST /tasks/cancel` and `POST /tasks/reset`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CountResponse {
    /// Number of tasks canceled.
    pub count: usize,
}

/// POST /tasks - Enqueue a task
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    tag = "tasks",
    request_body = Task,
    responses(
        (status = 201, description = "Task admitted", body = AcceptedResponse),
        (status = 400, description = "Invalid task definition"),
    )
)]
pub async fn enqueue_task(State(state): State<AppState>, Json(task): Json<Task>) -> Response {
    match state.engine.enqueue(task).await {
        Ok(accepted) => (StatusCode::CREATED, Json(AcceptedResponse { accepted })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /tasks - List all tasks, optionally filtered by group
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    tag = "tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Matching task records", body = Vec<TaskRecord>),
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Response {
    match state.engine.all_tasks(query.group.as_deref()).await {
        Ok(tasks) => (StatusCode::OK, Json(tasks)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /tasks/finished - List terminal task records, optionally filtered
#[utoipa::path(
    get,
    path = "/api/v1/tasks/finished",
    tag = "tasks",
    params(FinishedTaskQuery),
    responses(
        (status = 200, description = "Terminal task records", body = Vec<TaskRecord>),
    )
)]
pub async fn list_finished_tasks(
    State(state): State<AppState>,
    Query(query): Query<FinishedTaskQuery>,
) -> Response {
    let ignore_id = query.ignore_task_id.map(TaskId);
    match state
        .engine
        .tasks_finished(query.group.as_deref(), ignore_id.as_ref())
        .await
    {
        Ok(tasks) => (StatusCode::OK, Json(tasks)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /tasks/:id - Fetch a single task record
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task record", body = TaskRecord),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match get_task_or_404(&state, &id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_task_or_404(state: &AppState, id: &str) -> Result<TaskRecord> {
    state
        .engine
        .task_for_id(&TaskId(id.to_string()))
        .await?
        .ok_or_else(|| Error::NotFound(format!("task {id}")))
}

/// POST /tasks/:id/pause - Pause a running task
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/pause",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Whether the task was paused", body = AcceptedResponse),
    )
)]
pub async fn pause_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.pause(TaskId(id)).await {
        Ok(accepted) => (StatusCode::OK, Json(AcceptedResponse { accepted })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /tasks/:id/resume - Resume a paused or retryable task
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/resume",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Whether the task was resumed", body = AcceptedResponse),
    )
)]
pub async fn resume_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.resume(TaskId(id)).await {
        Ok(accepted) => (StatusCode::OK, Json(AcceptedResponse { accepted })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /tasks/cancel - Cancel a set of tasks
#[utoipa::path(
    post,
    path = "/api/v1/tasks/cancel",
    tag = "tasks",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Number of tasks canceled", body = CountResponse),
    )
)]
pub async fn cancel_tasks(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Response {
    match state.engine.cancel(request.task_ids).await {
        Ok(count) => (StatusCode::OK, Json(CountResponse { count })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /tasks/reset - Cancel every non-terminal task in a group (or all groups)
#[utoipa::path(
    post,
    path = "/api/v1/tasks/reset",
    tag = "tasks",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Number of tasks canceled", body = CountResponse),
    )
)]
pub async fn reset_tasks(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Response {
    match state.engine.reset(request.group).await {
        Ok(count) => (StatusCode::OK, Json(CountResponse { count })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /cleanup - Trigger an explicit task-record cleanup pass
#[utoipa::path(
    post,
    path = "/api/v1/cleanup",
    tag = "tasks",
    responses(
        (status = 202, description = "Cleanup pass requested"),
    )
)]
pub async fn trigger_cleanup(State(state): State<AppState>) -> impl IntoResponse {
    state.engine.request_cleanup().await;
    StatusCode::ACCEPTED
}
