use crate::{AppState, ValidJson};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use taglens_core::{RefResponse, SymbolResponse};
use tracing::info;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Deserialize)]
pub struct SymbolRequest {
    pub symbol: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: option_env!("CARGO_PKG_VERSION")
            .unwrap_or("0.1.0")
            .to_string(),
    })
}

pub async fn get_symbol(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SymbolRequest>,
) -> Json<SymbolResponse> {
    info!(symbol = %request.symbol, "get_symbol");
    Json(state.analyzer.symbol_info(&request.symbol).await)
}

pub async fn find_refs(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<SymbolRequest>,
) -> Json<RefResponse> {
    info!(symbol = %request.symbol, "find_refs");
    Json(state.analyzer.find_all_refs(&request.symbol).await)
}
