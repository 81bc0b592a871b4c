use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use relay_shared::{ActionLogRecord, ExecutionRecord};

use crate::error::{AppError, AppResult};
use crate::pagination::{PaginatedResponse, PaginationParams};
use crate::workflows::{RunResult, TriggerData, TriggerType};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub execution: ExecutionRecord,
    pub action_logs: Vec<ActionLogRecord>,
}

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id/run", post(run_workflow))
        .route("/:id/executions", get(list_workflow_executions))
}

pub fn execution_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id", get(get_execution))
}

pub fn trigger_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:trigger_type", post(dispatch_trigger))
}

/// Manual trigger; the body (if any) becomes the trigger data
async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<TriggerData>>,
) -> AppResult<Json<RunResult>> {
    let data = body.map(|Json(data)| data).unwrap_or_default();
    let result = state.engine.run_workflow(id, data).await?;
    Ok(Json(result))
}

/// Fan a trigger out to every active workflow listening for it
async fn dispatch_trigger(
    State(state): State<Arc<AppState>>,
    Path(trigger_type): Path<String>,
    body: Option<Json<TriggerData>>,
) -> AppResult<Json<Vec<RunResult>>> {
    let trigger_type: TriggerType = trigger_type.parse().map_err(AppError::BadRequest)?;
    let data = body.map(|Json(data)| data).unwrap_or_default();

    let results = state.engine.dispatch(trigger_type, data).await?;
    Ok(Json(results))
}

async fn list_workflow_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<PaginatedResponse<ExecutionRecord>>> {
    // 404 for unknown workflows rather than an empty page
    state.engine.get_workflow(id).await?;

    let (executions, total) = state
        .executions
        .list_executions(id, params.offset(), params.limit())
        .await?;

    Ok(Json(PaginatedResponse::new(executions, &params, total)))
}

async fn get_execution(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> AppResult<Json<ExecutionDetail>> {
    let execution = state
        .executions
        .get_execution(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Execution".to_string()))?;
    let action_logs = state.executions.list_action_logs(id).await?;

    Ok(Json(ExecutionDetail { execution, action_logs }))
}
