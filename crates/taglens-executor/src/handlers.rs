use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use taglens_core::Task;

use crate::{registry, ApiError, ApiResult, AppState, TaskPage, ValidJson};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub message: String,
    pub task_id: String,
}

#[derive(Deserialize)]
pub struct TaskStatusQuery {
    pub id: Option<String>,
}

#[derive(Serialize)]
pub struct TaskStatusResponse {
    pub exists: bool,
}

#[derive(Serialize)]
pub struct TaskNumResponse {
    pub task_count: usize,
}

#[derive(Deserialize)]
pub struct TaskListQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Serialize)]
pub struct ResultListResponse {
    pub results: Vec<String>,
}

#[derive(Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
}

#[derive(Serialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

/// Rejects names that could escape the store directory.
pub(crate) fn reject_traversal(name: &str) -> ApiResult<()> {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(ApiError::BadRequest(format!("invalid name {name:?}")));
    }
    Ok(())
}

fn generated_task_id() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    format!("task_{seconds}")
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: option_env!("CARGO_PKG_VERSION")
            .unwrap_or("0.1.0")
            .to_string(),
    })
}

pub async fn submit_task(
    State(state): State<AppState>,
    ValidJson(mut task): ValidJson<Task>,
) -> ApiResult<Json<SubmitResponse>> {
    if task.id.is_empty() {
        task.id = generated_task_id();
    }
    let task_id = task.id.clone();
    state
        .registry
        .submit(task)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(Json(SubmitResponse {
        status: "success".to_string(),
        message: "Task received".to_string(),
        task_id,
    }))
}

pub async fn task_status(
    State(state): State<AppState>,
    Query(query): Query<TaskStatusQuery>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("task id is required".to_string()))?;

    Ok(Json(TaskStatusResponse {
        exists: state.registry.contains(&id),
    }))
}

pub async fn task_num(State(state): State<AppState>) -> Json<TaskNumResponse> {
    Json(TaskNumResponse {
        task_count: state.registry.pending_count(),
    })
}

pub async fn task_list(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Json<TaskPage> {
    let page = registry::parse_page_param(query.page.as_deref());
    let limit = registry::parse_limit_param(query.limit.as_deref());
    Json(state.registry.page(page, limit))
}

pub async fn result_list(State(state): State<AppState>) -> ApiResult<Json<ResultListResponse>> {
    let results = state
        .results
        .list()
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(ResultListResponse { results }))
}

pub async fn export_result(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<impl IntoResponse> {
    let file = query
        .file
        .filter(|file| !file.is_empty())
        .ok_or_else(|| ApiError::BadRequest("file name is required".to_string()))?;
    reject_traversal(&file)?;

    let bytes = state.results.read(&file)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={file}"),
            ),
        ],
        bytes,
    ))
}

pub async fn delete_result(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<StatusMessage>> {
    let file = query
        .file
        .filter(|file| !file.is_empty())
        .ok_or_else(|| ApiError::BadRequest("file name is required".to_string()))?;
    reject_traversal(&file)?;

    state.results.delete(&file)?;
    Ok(Json(StatusMessage::success("File deleted successfully")))
}
