use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    handlers::{reject_traversal, StatusMessage},
    ApiError, ApiResult, AppState, PromptInfo, ValidJson,
};

#[derive(Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<String>,
}

#[derive(Serialize)]
pub struct PromptListResponse {
    pub prompts: Vec<PromptInfo>,
}

#[derive(Deserialize)]
pub struct DeletePromptRequest {
    #[serde(default)]
    pub name: String,
}

fn validate_prompt(info: &PromptInfo) -> ApiResult<()> {
    if info.name.is_empty() || info.system.is_empty() || info.init_user.is_empty() {
        return Err(ApiError::Validation(
            "name, system and init_user are required".to_string(),
        ));
    }
    reject_traversal(&info.name)
}

pub async fn prompt_templates(State(state): State<AppState>) -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: state.prompts.template_names(),
    })
}

pub async fn prompt_list(State(state): State<AppState>) -> Json<PromptListResponse> {
    Json(PromptListResponse {
        prompts: state.prompts.list(),
    })
}

pub async fn create_prompt(
    State(state): State<AppState>,
    ValidJson(info): ValidJson<PromptInfo>,
) -> ApiResult<Json<StatusMessage>> {
    validate_prompt(&info)?;
    state.prompts.create(&info)?;
    Ok(Json(StatusMessage::success("Prompt created successfully")))
}

pub async fn update_prompt(
    State(state): State<AppState>,
    ValidJson(info): ValidJson<PromptInfo>,
) -> ApiResult<Json<StatusMessage>> {
    validate_prompt(&info)?;
    state.prompts.update(&info)?;
    Ok(Json(StatusMessage::success("Prompt updated successfully")))
}

pub async fn delete_prompt(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<DeletePromptRequest>,
) -> ApiResult<Json<StatusMessage>> {
    if request.name.is_empty() {
        return Err(ApiError::Validation("prompt name is required".to_string()));
    }
    reject_traversal(&request.name)?;
    state.prompts.delete(&request.name)?;
    Ok(Json(StatusMessage::success("Prompt deleted successfully")))
}
