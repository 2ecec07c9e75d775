use crate::{batch, config_handlers, handlers, prompt_handlers, AppState};
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.static_dir.clone();

    Router::new()
        .route("/health", get(handlers::health))
        // Task submission and monitoring
        .route("/api/submit_task", post(handlers::submit_task))
        .route("/api/submit_batch_task", post(batch::submit_batch_task))
        .route("/api/task_status", get(handlers::task_status))
        .route("/api/task_num", get(handlers::task_num))
        .route("/api/task_list", get(handlers::task_list))
        // Result files
        .route("/api/result_list", get(handlers::result_list))
        .route("/api/export_result", get(handlers::export_result))
        .route("/api/delete_result", delete(handlers::delete_result))
        // Prompt templates
        .route("/api/prompt_templates", get(prompt_handlers::prompt_templates))
        .route("/api/prompt_list", get(prompt_handlers::prompt_list))
        .route("/api/create_prompt", post(prompt_handlers::create_prompt))
        .route("/api/update_prompt", post(prompt_handlers::update_prompt))
        .route("/api/delete_prompt", post(prompt_handlers::delete_prompt))
        // Configuration
        .route("/config", get(config_handlers::config_page))
        .route("/get_config", get(config_handlers::get_config))
        .route("/api/update_llm", post(config_handlers::update_llm))
        .route(
            "/api/update_code_server",
            post(config_handlers::update_code_server),
        )
        .route("/api/delete_config", post(config_handlers::delete_config))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
}
