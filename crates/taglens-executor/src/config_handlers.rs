use axum::{
    extract::State,
    response::{Html, IntoResponse},
    Json,
};
use serde::Deserialize;

use crate::{
    handlers::StatusMessage, ApiError, ApiResult, AppState, CodeServerEndpoint, ConfigDocument,
    ConfigKind, LlmProfile, ValidJson,
};

#[derive(Deserialize)]
pub struct DeleteConfigRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

pub async fn config_page(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let html = std::fs::read_to_string(&state.config_page)
        .map_err(|_| ApiError::Internal("Failed to read config page".to_string()))?;
    Ok(Html(html))
}

pub async fn get_config(State(state): State<AppState>) -> Json<ConfigDocument> {
    Json(state.config.document())
}

pub async fn update_llm(
    State(state): State<AppState>,
    ValidJson(profile): ValidJson<LlmProfile>,
) -> ApiResult<Json<StatusMessage>> {
    state.config.upsert_llm(profile)?;
    Ok(Json(StatusMessage::success("LLM config saved")))
}

pub async fn update_code_server(
    State(state): State<AppState>,
    ValidJson(endpoint): ValidJson<CodeServerEndpoint>,
) -> ApiResult<Json<StatusMessage>> {
    state.config.upsert_code_server(endpoint)?;
    Ok(Json(StatusMessage::success("Code server config saved")))
}

pub async fn delete_config(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<DeleteConfigRequest>,
) -> ApiResult<Json<StatusMessage>> {
    let kind = ConfigKind::from_wire(&request.kind)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid config type {:?}", request.kind)))?;
    state.config.delete(kind, &request.name)?;
    Ok(Json(StatusMessage::success("Config deleted")))
}
