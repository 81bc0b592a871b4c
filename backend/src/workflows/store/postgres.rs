// Postgres store - sqlx implementation of every store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::error;
use uuid::Uuid;

use relay_shared::{ActionLogRecord, ExecutionRecord, RunStats, StoredRecord};

use super::{
    validate_entity_name, DefinitionStore, ExecutionOutcome, ExecutionStore, RecordRepository,
    StoreError, StoreResult,
};
use crate::workflows::engine::WorkflowDefinition;
use crate::workflows::triggers::TriggerType;

#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct WorkflowRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
    trigger_type: String,
    trigger_config: serde_json::Value,
    actions: serde_json::Value,
    is_active: bool,
    run_count: i64,
    success_rate: Decimal,
    last_run_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkflowRow> for WorkflowDefinition {
    type Error = StoreError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        let trigger_type: TriggerType =
            serde_json::from_value(serde_json::Value::String(row.trigger_type))?;

        Ok(WorkflowDefinition {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            trigger_type,
            trigger_config: row.trigger_config,
            actions: serde_json::from_value(row.actions)?,
            is_active: row.is_active,
            run_count: row.run_count,
            success_rate: row.success_rate,
            last_run_at: row.last_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const WORKFLOW_COLUMNS: &str = "id, owner_id, name, description, trigger_type, trigger_config, actions, \
     is_active, run_count, success_rate, last_run_at, created_at, updated_at";

const EXECUTION_COLUMNS: &str =
    "id, workflow_id, status, trigger_data, started_at, completed_at, duration_ms, error_message";

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DefinitionStore for PgWorkflowStore {
    async fn get_workflow(&self, id: Uuid) -> StoreResult<Option<WorkflowDefinition>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows WHERE id = $1",
            WORKFLOW_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowDefinition::try_from).transpose()
    }

    async fn list_active(&self) -> StoreResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows WHERE is_active = true ORDER BY created_at ASC",
            WORKFLOW_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        // One undecodable definition must not hide the others
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                WorkflowDefinition::try_from(row)
                    .map_err(|e| error!("Skipping workflow {}: stored definition is unreadable: {}", id, e))
                    .ok()
            })
            .collect())
    }

    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (
                id, owner_id, name, description, trigger_type, trigger_config, actions,
                is_active, run_count, success_rate, last_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                trigger_type = EXCLUDED.trigger_type,
                trigger_config = EXCLUDED.trigger_config,
                actions = EXCLUDED.actions,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.owner_id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.trigger_type.as_str())
        .bind(&workflow.trigger_config)
        .bind(serde_json::to_value(&workflow.actions)?)
        .bind(workflow.is_active)
        .bind(workflow.run_count)
        .bind(workflow.success_rate)
        .bind(workflow.last_run_at)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_run_outcome(&self, workflow_id: Uuid, succeeded: bool) -> StoreResult<RunStats> {
        // Single statement: the row lock serialises concurrent completions
        let stats = sqlx::query_as::<_, RunStats>(
            r#"
            UPDATE workflows
            SET success_rate = ROUND((success_rate * run_count + $2) / (run_count + 1), 2),
                run_count = run_count + 1,
                last_run_at = NOW()
            WHERE id = $1
            RETURNING run_count, success_rate, last_run_at
            "#,
        )
        .bind(workflow_id)
        .bind(if succeeded { Decimal::ONE_HUNDRED } else { Decimal::ZERO })
        .fetch_optional(&self.pool)
        .await?;

        stats.ok_or_else(|| StoreError::NotFound(format!("Workflow {}", workflow_id)))
    }
}

#[async_trait]
impl ExecutionStore for PgWorkflowStore {
    async fn insert_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, workflow_id, status, trigger_data, started_at, completed_at, duration_ms, error_message
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.workflow_id)
        .bind(record.status)
        .bind(&record.trigger_data)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.duration_ms)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_execution(&self, execution_id: Uuid, outcome: &ExecutionOutcome) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $2, completed_at = $3, duration_ms = $4, error_message = $5
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .bind(outcome.status)
        .bind(outcome.completed_at)
        .bind(outcome.duration_ms)
        .bind(&outcome.error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("Execution {}", execution_id)));
        }
        Ok(())
    }

    async fn insert_action_log(&self, log: &ActionLogRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_action_logs (
                id, execution_id, workflow_id, action_id, action_type, action_name, attempt,
                status, input, output, error, duration_ms, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(log.id)
        .bind(log.execution_id)
        .bind(log.workflow_id)
        .bind(&log.action_id)
        .bind(&log.action_type)
        .bind(&log.action_name)
        .bind(log.attempt)
        .bind(log.status)
        .bind(&log.input)
        .bind(&log.output)
        .bind(&log.error)
        .bind(log.duration_ms)
        .bind(log.started_at)
        .bind(log.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> StoreResult<Option<ExecutionRecord>> {
        let record = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "SELECT {} FROM workflow_executions WHERE id = $1",
            EXECUTION_COLUMNS
        ))
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_executions(
        &self,
        workflow_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<ExecutionRecord>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_one(&self.pool)
            .await?;

        let records = sqlx::query_as::<_, ExecutionRecord>(&format!(
            "SELECT {} FROM workflow_executions WHERE workflow_id = $1 \
             ORDER BY started_at DESC LIMIT $2 OFFSET $3",
            EXECUTION_COLUMNS
        ))
        .bind(workflow_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((records, total))
    }

    async fn list_action_logs(&self, execution_id: Uuid) -> StoreResult<Vec<ActionLogRecord>> {
        let logs = sqlx::query_as::<_, ActionLogRecord>(
            r#"
            SELECT id, execution_id, workflow_id, action_id, action_type, action_name, attempt,
                   status, input, output, error, duration_ms, started_at, completed_at
            FROM workflow_action_logs
            WHERE execution_id = $1
            ORDER BY started_at ASC, attempt ASC
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }
}

#[async_trait]
impl RecordRepository for PgWorkflowStore {
    async fn create_record(
        &self,
        entity: &str,
        owner_id: Option<Uuid>,
        data: serde_json::Value,
    ) -> StoreResult<StoredRecord> {
        validate_entity_name(entity)?;

        let record = sqlx::query_as::<_, StoredRecord>(
            r#"
            INSERT INTO records (id, entity, owner_id, data, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, entity, owner_id, data, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entity)
        .bind(owner_id)
        .bind(&data)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_record(&self, entity: &str, id: Uuid, patch: serde_json::Value) -> StoreResult<StoredRecord> {
        validate_entity_name(entity)?;

        // jsonb `||` is a shallow merge for two objects
        let record = sqlx::query_as::<_, StoredRecord>(
            r#"
            UPDATE records
            SET data = CASE
                    WHEN jsonb_typeof(data) = 'object' AND jsonb_typeof($3::jsonb) = 'object'
                    THEN data || $3::jsonb
                    ELSE $3::jsonb
                END,
                updated_at = NOW()
            WHERE entity = $1 AND id = $2
            RETURNING id, entity, owner_id, data, created_at, updated_at
            "#,
        )
        .bind(entity)
        .bind(id)
        .bind(&patch)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| StoreError::NotFound(format!("Record {}/{}", entity, id)))
    }

    async fn get_record(&self, entity: &str, id: Uuid) -> StoreResult<Option<StoredRecord>> {
        validate_entity_name(entity)?;

        let record = sqlx::query_as::<_, StoredRecord>(
            "SELECT id, entity, owner_id, data, created_at, updated_at FROM records WHERE entity = $1 AND id = $2",
        )
        .bind(entity)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
