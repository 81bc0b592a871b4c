//! Error types for the Relay engine and its HTTP surface
//!
//! Engine-level failures are typed with `thiserror`; the HTTP layer maps them
//! onto a consistent JSON error body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::workflows::store::StoreError;
use crate::workflows::ActionType;

/// Failure raised by an action handler. Every variant is an ordinary action
/// failure and is retried according to the action's policy.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid action configuration: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn missing(field: &str) -> Self {
        Self::Config(format!("missing '{}'", field))
    }
}

impl From<reqwest::Error> for HandlerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Failure of the engine itself, as opposed to a failed action
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("Workflow {0} is not active")]
    WorkflowInactive(Uuid),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("No handler registered for action types: {}", format_types(.0))]
    UnregisteredActionTypes(Vec<ActionType>),

    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),
}

fn format_types(types: &[ActionType]) -> String {
    types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
}

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code such as `NOT_FOUND`
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Errors surfaced by the HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    InvalidWorkflow(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidWorkflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::InvalidWorkflow(_) => "INVALID_WORKFLOW",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message returned to the caller; internal details only reach the log
    pub fn message(&self) -> String {
        match self {
            Self::Internal(detail) => {
                tracing::error!("Request failed: {}", detail);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiError {
            code: self.error_code().to_string(),
            message: self.message(),
            timestamp: Utc::now(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::InvalidEntity(name) => Self::BadRequest(format!("invalid entity name '{}'", name)),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::WorkflowNotFound(_) => Self::NotFound("Workflow".to_string()),
            EngineError::WorkflowInactive(id) => Self::Conflict(format!("Workflow {} is not active", id)),
            EngineError::InvalidDefinition(msg) => Self::InvalidWorkflow(msg),
            EngineError::UnregisteredActionTypes(_) => Self::Internal(err.to_string()),
            EngineError::Store(store) => store.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
