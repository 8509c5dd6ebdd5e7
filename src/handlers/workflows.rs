// HTTP surface of the workflow engine.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::workflows::context::EvaluationContext;
use crate::workflows::engine::{WorkflowDefinition, WorkflowExecution, WorkflowExecutionLog};
use crate::workflows::triggers::{TriggerPayload, TriggerType};
use crate::AppState;

#[derive(Serialize)]
pub struct TriggerResponse {
    pub execution_ids: Vec<Uuid>,
}

/// Fire a trigger against all matching active definitions.
pub async fn fire_trigger(
    State(state): State<Arc<AppState>>,
    Path(trigger_type): Path<String>,
    Json(payload): Json<TriggerPayload>,
) -> ApiResult<Json<TriggerResponse>> {
    let trigger_type: TriggerType = trigger_type
        .parse()
        .map_err(AppError::BadRequest)?;

    let execution_ids = state.triggers.fire_trigger(trigger_type, payload).await?;
    Ok(Json(TriggerResponse { execution_ids }))
}

pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<WorkflowDefinition>>> {
    Ok(Json(state.stores.workflows.list_all().await?))
}

#[derive(Serialize)]
pub struct RunResponse {
    pub execution_id: Uuid,
}

/// Run one definition directly, bypassing trigger matching. The condition
/// still gates the run.
pub async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TriggerPayload>,
) -> ApiResult<Json<RunResponse>> {
    let definition = state.stores.workflows.get(id).await?;
    let context =
        EvaluationContext::build(&state.stores, TriggerType::Manual, payload).await?;
    let execution_id = state.engine.execute(&definition, context).await?;
    Ok(Json(RunResponse { execution_id }))
}

#[derive(Serialize)]
pub struct TestStepReport {
    pub step: String,
    pub action_type: String,
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct TestResponse {
    pub condition_matched: bool,
    pub condition_detail: String,
    pub steps: Vec<TestStepReport>,
}

/// Dry-run a definition: no records are written, no messages sent.
pub async fn test_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TriggerPayload>,
) -> ApiResult<Json<TestResponse>> {
    let definition = state.stores.workflows.get(id).await?;
    let context =
        EvaluationContext::build(&state.stores, TriggerType::Manual, payload).await?;
    let report = state.engine.test_workflow(&definition, &context).await?;

    Ok(Json(TestResponse {
        condition_matched: report.condition.matched,
        condition_detail: report.condition.detail,
        steps: report
            .steps
            .into_iter()
            .map(|(step, action_type, outcome)| TestStepReport {
                step,
                action_type: action_type.to_string(),
                success: outcome.success,
                message: outcome.message,
            })
            .collect(),
    }))
}

pub async fn get_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowExecution>> {
    Ok(Json(state.stores.executions.get(id).await?))
}

pub async fn get_execution_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<WorkflowExecutionLog>>> {
    // 404 for unknown executions rather than an empty log list.
    state.stores.executions.get(id).await?;
    Ok(Json(state.engine.execution_logs(id).await?))
}

pub async fn cancel_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.cancel_execution(id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

pub async fn resume_execution(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.engine.resume_execution(id).await?;
    Ok(Json(serde_json::json!({ "resumed": true })))
}
