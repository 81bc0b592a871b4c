// Workflow Engine - Long-lived service that owns definitions and dispatches runs

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use relay_shared::RunStats;

use super::actions::ActionSpec;
use super::executor::{RunResult, WorkflowExecutor};
use super::registry::HandlerRegistry;
use super::store::{DefinitionStore, ExecutionStore};
use super::triggers::{TriggerData, TriggerEvent, TriggerType};
use crate::error::EngineError;

/// Payload keys a trigger config can pin to an exact value
const TRIGGER_FILTER_KEYS: [&str; 5] = ["event_type", "form_id", "webhook_id", "entity", "operation"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: serde_json::Value,
    pub actions: Vec<ActionSpec>,
    pub is_active: bool,
    #[serde(default)]
    pub run_count: i64,
    #[serde(default)]
    pub success_rate: Decimal,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    pub fn new(owner_id: Uuid, name: &str, trigger_type: TriggerType, actions: Vec<ActionSpec>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: None,
            trigger_type,
            trigger_config: serde_json::json!({}),
            actions,
            is_active: true,
            run_count: 0,
            success_rate: Decimal::ZERO,
            last_run_at: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_trigger_config(mut self, config: serde_json::Value) -> Self {
        self.trigger_config = config;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Positions and action ids must both be unique
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut positions = HashSet::new();
        let mut ids = HashSet::new();

        for action in &self.actions {
            if !positions.insert(action.position) {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate action position {} in workflow '{}'",
                    action.position, self.name
                )));
            }
            if !ids.insert(action.id.as_str()) {
                return Err(EngineError::InvalidDefinition(format!(
                    "duplicate action id '{}' in workflow '{}'",
                    action.id, self.name
                )));
            }
        }

        Ok(())
    }

    /// Actions in execution order
    pub fn sorted_actions(&self) -> Vec<&ActionSpec> {
        let mut actions: Vec<&ActionSpec> = self.actions.iter().collect();
        actions.sort_by_key(|a| a.position);
        actions
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            run_count: self.run_count,
            success_rate: self.success_rate,
            last_run_at: self.last_run_at,
        }
    }

    pub fn apply_stats(&mut self, stats: &RunStats) {
        self.run_count = stats.run_count;
        self.success_rate = stats.success_rate;
        self.last_run_at = stats.last_run_at;
    }

    /// Does this workflow listen for the given trigger?
    pub fn matches_trigger(&self, trigger_type: TriggerType, data: &TriggerData) -> bool {
        if !self.is_active || self.trigger_type != trigger_type {
            return false;
        }

        TRIGGER_FILTER_KEYS.iter().all(|key| match self.trigger_config.get(*key) {
            None | Some(serde_json::Value::Null) => true,
            Some(expected) => data.get(*key) == Some(expected),
        })
    }
}

/// Constructed once at startup and shared behind `Arc`
pub struct WorkflowEngine {
    definitions: Arc<dyn DefinitionStore>,
    executor: WorkflowExecutor,
}

impl WorkflowEngine {
    /// Build the engine and report action types referenced by active
    /// workflows that have no handler. Those workflows stay loaded and their
    /// runs fail at the offending action.
    pub async fn new(
        definitions: Arc<dyn DefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: HandlerRegistry,
        default_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let active = definitions.list_active().await?;
        if let Err(e) = registry.validate(&active) {
            error!("{}", e);
            for workflow in &active {
                let missing: Vec<&str> = workflow
                    .actions
                    .iter()
                    .filter(|a| !registry.contains(a.action_type))
                    .map(|a| a.type_tag())
                    .collect();
                if !missing.is_empty() {
                    error!(
                        "Workflow '{}' ({}) uses action types with no handler: {}",
                        workflow.name,
                        workflow.id,
                        missing.join(", ")
                    );
                }
            }
        }

        info!("Workflow engine ready: {} active workflows", active.len());

        let executor = WorkflowExecutor::new(definitions.clone(), executions, Arc::new(registry), default_timeout);
        Ok(Self { definitions, executor })
    }

    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    pub async fn get_workflow(&self, id: Uuid) -> Result<WorkflowDefinition, EngineError> {
        self.definitions
            .get_workflow(id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(id))
    }

    /// Run one workflow by id (manual trigger)
    pub async fn run_workflow(&self, id: Uuid, data: TriggerData) -> Result<RunResult, EngineError> {
        let workflow = self.get_workflow(id).await?;
        if !workflow.is_active {
            return Err(EngineError::WorkflowInactive(id));
        }

        self.executor.run(&workflow, data).await
    }

    /// Run every active workflow listening for this trigger.
    ///
    /// Runs are independent and proceed concurrently. A run that cannot
    /// start is logged and left out of the returned results.
    pub async fn dispatch(&self, trigger_type: TriggerType, data: TriggerData) -> Result<Vec<RunResult>, EngineError> {
        let matching: Vec<WorkflowDefinition> = self
            .definitions
            .list_active()
            .await?
            .into_iter()
            .filter(|w| w.matches_trigger(trigger_type, &data))
            .collect();

        info!("Dispatching {} trigger to {} workflows", trigger_type.as_str(), matching.len());

        let runs = matching.iter().map(|w| self.executor.run(w, data.clone()));
        let mut results = Vec::new();
        for (workflow, outcome) in matching.iter().zip(join_all(runs).await) {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => error!("Workflow '{}' could not run: {}", workflow.name, e),
            }
        }

        Ok(results)
    }

    pub async fn handle_event(&self, event: TriggerEvent) -> Result<Vec<RunResult>, EngineError> {
        self.dispatch(event.trigger_type, event.payload).await
    }
}
