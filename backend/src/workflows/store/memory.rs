// In-memory store - Process-local implementation of every store trait

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use relay_shared::{ActionLogRecord, ExecutionRecord, RunStats, StoredRecord};

use super::{
    merge_shallow, validate_entity_name, DefinitionStore, ExecutionOutcome, ExecutionStore,
    RecordRepository, StoreError, StoreResult,
};
use crate::workflows::engine::WorkflowDefinition;

/// Backs tests and single-node deployments without a database.
///
/// Statistics updates take the workflows write lock for the whole
/// read-modify-write, so concurrent completions never lose a count.
#[derive(Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<Uuid, WorkflowDefinition>>,
    executions: RwLock<HashMap<Uuid, ExecutionRecord>>,
    action_logs: RwLock<Vec<ActionLogRecord>>,
    records: RwLock<HashMap<(String, Uuid), StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_workflows(workflows: Vec<WorkflowDefinition>) -> Self {
        let store = Self::new();
        {
            let mut map = store.workflows.write().await;
            for workflow in workflows {
                map.insert(workflow.id, workflow);
            }
        }
        store
    }

    /// All records of one entity, oldest first
    pub async fn records_for(&self, entity: &str) -> Vec<StoredRecord> {
        let records = self.records.read().await;
        let mut found: Vec<StoredRecord> = records
            .values()
            .filter(|r| r.entity == entity)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        found
    }
}

#[async_trait]
impl DefinitionStore for InMemoryStore {
    async fn get_workflow(&self, id: Uuid) -> StoreResult<Option<WorkflowDefinition>> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<WorkflowDefinition>> {
        let workflows = self.workflows.read().await;
        let mut active: Vec<WorkflowDefinition> =
            workflows.values().filter(|w| w.is_active).cloned().collect();
        active.sort_by_key(|w| w.created_at);
        Ok(active)
    }

    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> StoreResult<()> {
        self.workflows.write().await.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn record_run_outcome(&self, workflow_id: Uuid, succeeded: bool) -> StoreResult<RunStats> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| StoreError::NotFound(format!("Workflow {}", workflow_id)))?;

        let stats = workflow.stats().after_run(succeeded, Utc::now());
        workflow.apply_stats(&stats);
        Ok(stats)
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn insert_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        self.executions.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn finish_execution(&self, execution_id: Uuid, outcome: &ExecutionOutcome) -> StoreResult<()> {
        let mut executions = self.executions.write().await;
        let record = executions
            .get_mut(&execution_id)
            .ok_or_else(|| StoreError::NotFound(format!("Execution {}", execution_id)))?;

        record.status = outcome.status;
        record.completed_at = Some(outcome.completed_at);
        record.duration_ms = Some(outcome.duration_ms);
        record.error_message = outcome.error_message.clone();
        Ok(())
    }

    async fn insert_action_log(&self, log: &ActionLogRecord) -> StoreResult<()> {
        self.action_logs.write().await.push(log.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: Uuid) -> StoreResult<Option<ExecutionRecord>> {
        Ok(self.executions.read().await.get(&execution_id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<ExecutionRecord>, i64)> {
        let executions = self.executions.read().await;
        let mut matching: Vec<ExecutionRecord> = executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_action_logs(&self, execution_id: Uuid) -> StoreResult<Vec<ActionLogRecord>> {
        // Insertion order already follows start time then attempt
        let logs = self.action_logs.read().await;
        Ok(logs
            .iter()
            .filter(|l| l.execution_id == execution_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RecordRepository for InMemoryStore {
    async fn create_record(
        &self,
        entity: &str,
        owner_id: Option<Uuid>,
        data: serde_json::Value,
    ) -> StoreResult<StoredRecord> {
        validate_entity_name(entity)?;

        let record = StoredRecord {
            id: Uuid::new_v4(),
            entity: entity.to_string(),
            owner_id,
            data,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.records
            .write()
            .await
            .insert((entity.to_string(), record.id), record.clone());
        Ok(record)
    }

    async fn update_record(&self, entity: &str, id: Uuid, patch: serde_json::Value) -> StoreResult<StoredRecord> {
        validate_entity_name(entity)?;

        let mut records = self.records.write().await;
        let record = records
            .get_mut(&(entity.to_string(), id))
            .ok_or_else(|| StoreError::NotFound(format!("Record {}/{}", entity, id)))?;

        record.data = merge_shallow(&record.data, patch);
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn get_record(&self, entity: &str, id: Uuid) -> StoreResult<Option<StoredRecord>> {
        validate_entity_name(entity)?;
        Ok(self.records.read().await.get(&(entity.to_string(), id)).cloned())
    }
}
