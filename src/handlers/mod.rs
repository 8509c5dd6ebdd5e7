use axum::{extract::State, routing::get, routing::post, Json, Router};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod workflows;

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(workflows::list_workflows))
        .route("/:id/run", post(workflows::run_workflow))
        .route("/:id/test", post(workflows::test_workflow))
}

pub fn trigger_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:trigger_type", post(workflows::fire_trigger))
}

pub fn execution_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id", get(workflows::get_execution))
        .route("/:id/logs", get(workflows::get_execution_logs))
        .route("/:id/cancel", post(workflows::cancel_execution))
        .route("/:id/resume", post(workflows::resume_execution))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let database = crate::database::health_check(&state.db_pool).await;
    Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "database": database,
    }))
}
