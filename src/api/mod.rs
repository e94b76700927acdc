use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::patch;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::*;
use crate::selectors::{self, FilterType, StatusColumns, TaskCounts};
use crate::state::AppState;
use crate::store::ErrorKind;

#[derive(Deserialize)]
struct TaskQueryParams {
    #[serde(default)]
    filter: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub counts: TaskCounts,
    pub loading: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub is_remote_backed: bool,
}

#[derive(Deserialize)]
struct CompleteRequest {
    completed: bool,
}

#[derive(Deserialize)]
struct StatusRequest {
    status: TaskStatus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/board", get(board))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/tasks/{id}/complete", patch(toggle_complete))
        .route("/tasks/{id}/status", patch(move_task))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>
) -> Result<Json<TaskListResponse>, AppError> {
    let filter = match params.filter.as_deref() {
        None => FilterType::All,
        Some(raw) => raw
            .parse::<FilterType>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
    };

    let snapshot = state.store.snapshot();
    Ok(Json(TaskListResponse {
        counts: selectors::counts(&snapshot.tasks),
        tasks: selectors::filter_by(&snapshot.tasks, filter),
        loading: snapshot.loading,
        error: snapshot.error,
        error_kind: snapshot.error_kind,
        is_remote_backed: snapshot.is_remote_backed,
    }))
}

async fn board(State(state): State<AppState>) -> Json<StatusColumns> {
    let snapshot = state.store.snapshot();
    Json(selectors::group_by_status(&snapshot.tasks))
}

// Commands are accepted even when the store turns them into no-ops.
async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<NewTask>
) -> StatusCode {
    state.store.add(&req.title, req.priority);
    StatusCode::ACCEPTED
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TaskPatch>
) -> StatusCode {
    state.store.update(&id, req);
    StatusCode::ACCEPTED
}

async fn toggle_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>
) -> StatusCode {
    state.store.toggle_complete(&id, req.completed);
    StatusCode::ACCEPTED
}

async fn move_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>
) -> StatusCode {
    state.store.reorder_by_status(&id, req.status);
    StatusCode::ACCEPTED
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> StatusCode {
    state.store.delete(&id);
    StatusCode::NO_CONTENT
}
