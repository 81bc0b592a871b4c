// Workflow Stores - Persistence seams used by the engine and its handlers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use uuid::Uuid;

use relay_shared::{ActionLogRecord, ExecutionRecord, ExecutionStatus, RunStats, StoredRecord};

use super::engine::WorkflowDefinition;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgWorkflowStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Invalid entity name '{0}'")]
    InvalidEntity(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Final state written to an execution record when a run ends
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub error_message: Option<String>,
}

/// Workflow definitions plus their rolling statistics
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn get_workflow(&self, id: Uuid) -> StoreResult<Option<WorkflowDefinition>>;

    async fn list_active(&self) -> StoreResult<Vec<WorkflowDefinition>>;

    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()>;

    /// Fold one finished run into `run_count`, `success_rate` and
    /// `last_run_at` as a single atomic update.
    async fn record_run_outcome(&self, workflow_id: Uuid, succeeded: bool) -> StoreResult<RunStats>;
}

/// Execution history and per-attempt action logs
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert_execution(&self, record: &ExecutionRecord) -> StoreResult<()>;

    async fn finish_execution(&self, execution_id: Uuid, outcome: &ExecutionOutcome) -> StoreResult<()>;

    async fn insert_action_log(&self, log: &ActionLogRecord) -> StoreResult<()>;

    async fn get_execution(&self, execution_id: Uuid) -> StoreResult<Option<ExecutionRecord>>;

    /// Newest first, with the total number of executions for the workflow
    async fn list_executions(
        &self,
        workflow_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<ExecutionRecord>, i64)>;

    /// Ordered by start time, then attempt
    async fn list_action_logs(&self, execution_id: Uuid) -> StoreResult<Vec<ActionLogRecord>>;
}

/// Generic business records addressed by entity name
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn create_record(
        &self,
        entity: &str,
        owner_id: Option<Uuid>,
        data: serde_json::Value,
    ) -> StoreResult<StoredRecord>;

    /// Shallow-merge `patch` into the stored data
    async fn update_record(&self, entity: &str, id: Uuid, patch: serde_json::Value) -> StoreResult<StoredRecord>;

    async fn get_record(&self, entity: &str, id: Uuid) -> StoreResult<Option<StoredRecord>>;
}

/// Entity names are lowercase identifiers: `^[a-z][a-z0-9_]*$`
pub fn validate_entity_name(entity: &str) -> StoreResult<()> {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[a-z][a-z0-9_]*$").expect("entity pattern is valid")
    });

    if pattern.is_match(entity) {
        Ok(())
    } else {
        Err(StoreError::InvalidEntity(entity.to_string()))
    }
}

/// Shallow merge used by record updates; non-object patches replace the data
pub fn merge_shallow(base: &serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(current), serde_json::Value::Object(changes)) => {
            let mut merged = current.clone();
            merged.extend(changes);
            serde_json::Value::Object(merged)
        }
        (_, replacement) => replacement,
    }
}
