use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{database, AppState};

pub mod workflows;

pub use workflows::{execution_routes, trigger_routes, workflow_routes};

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let db = match &state.db_pool {
        Some(pool) => {
            if database::health_check(pool).await {
                "ok"
            } else {
                "unavailable"
            }
        }
        None => "in_memory",
    };
    let status = if db == "unavailable" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "database": db,
        "registered_handlers": state.engine.executor().registry().len(),
    });
    (status, Json(body))
}
