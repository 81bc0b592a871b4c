//! Relay backend: the workflow automation engine plus a small HTTP surface
//! for running workflows and reading their execution history.

use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod pagination;
pub mod services;
pub mod workflows;

pub use error::{ApiError, AppError, AppResult};
pub use pagination::{PaginatedResponse, PaginationParams};

use workflows::{ExecutionStore, WorkflowEngine};

#[cfg(test)]
mod tests;

pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    pub executions: Arc<dyn ExecutionStore>,
    /// Absent when running over the in-memory store
    pub db_pool: Option<sqlx::PgPool>,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>, executions: Arc<dyn ExecutionStore>) -> Self {
        Self {
            engine,
            executions,
            db_pool: None,
        }
    }

    pub fn with_db_pool(mut self, pool: sqlx::PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/executions", handlers::execution_routes())
        .nest("/api/v1/triggers", handlers::trigger_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
