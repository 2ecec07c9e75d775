use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use taglens_core::{RefResponse, Task};
use tracing::warn;

use crate::{prompts, ApiError, ApiResult, AppState, CodeServerClient, ValidJson};

/// Expands one problem type across a set of target functions: every caller
/// of every function becomes its own task, all sharing the request id.
#[derive(Debug, Deserialize)]
pub struct BatchTaskRequest {
    #[serde(default)]
    pub problem_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "function")]
    pub functions: Vec<String>,
    #[serde(default)]
    pub llm_config: String,
    #[serde(default)]
    pub code_server: String,
}

#[derive(Serialize)]
pub struct BatchSubmitResponse {
    pub status: String,
    pub message: String,
    pub task_ids: Vec<String>,
    pub count: usize,
}

pub async fn submit_batch_task(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<BatchTaskRequest>,
) -> ApiResult<Json<BatchSubmitResponse>> {
    if request.problem_type.is_empty()
        || request.functions.is_empty()
        || request.llm_config.is_empty()
        || request.code_server.is_empty()
    {
        return Err(ApiError::Validation("missing required parameters".to_string()));
    }

    let template = state.prompts.load(&request.problem_type)?;

    let url = state
        .config
        .code_server_url(&request.code_server)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("code server {} not found", request.code_server))
        })?;
    let code_server =
        CodeServerClient::new(&url).map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let mut task_ids = Vec::new();
    for function_name in &request.functions {
        // Best effort per function: an unreachable server or an unparseable
        // response skips the function, not the batch.
        let body = match code_server.find_refs(function_name).await {
            Ok(body) => body,
            Err(err) => {
                warn!(function = %function_name, "find_refs failed: {err:#}");
                continue;
            }
        };
        let refs: RefResponse = match serde_json::from_str(&body) {
            Ok(refs) => refs,
            Err(err) => {
                warn!(function = %function_name, %err, "unparseable find_refs response");
                continue;
            }
        };

        for caller in &refs.callers {
            if caller.trim().is_empty() {
                continue;
            }
            let prompt = prompts::render(&template, function_name, caller);
            let task = Task {
                id: request.id.clone(),
                system_prompt: prompt.system,
                user_prompt: prompt.init_user,
                code_server_name: request.code_server.clone(),
                llm_config_name: request.llm_config.clone(),
            };
            state
                .registry
                .submit(task)
                .await
                .map_err(|err| ApiError::Internal(err.to_string()))?;
            task_ids.push(request.id.clone());
        }
    }

    let count = task_ids.len();
    Ok(Json(BatchSubmitResponse {
        status: "success".to_string(),
        message: "Batch tasks submitted".to_string(),
        task_ids,
        count,
    }))
}
