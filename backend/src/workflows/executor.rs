// Workflow Executor - Drives one workflow run end to end

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use relay_shared::{ActionLogRecord, ActionStatus, ExecutionRecord, ExecutionStatus};

use super::actions::{ActionResult, ActionSpec};
use super::conditions;
use super::engine::WorkflowDefinition;
use super::registry::HandlerRegistry;
use super::retry::{self, AttemptRecord};
use super::store::{DefinitionStore, ExecutionOutcome, ExecutionStore};
use super::templates;
use super::triggers::TriggerData;
use crate::error::EngineError;

pub const UNKNOWN_ACTION_TYPE: &str = "unknown action type";

/// Per-run state. Created when a run starts and dropped when it ends.
///
/// Variables and previous results only grow during a run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub user_id: Option<Uuid>,
    trigger_data: Map<String, Value>,
    variables: Map<String, Value>,
    previous_results: Map<String, Value>,
}

impl ExecutionContext {
    /// Seed variables with the trigger fields plus a `trigger` alias
    pub fn new(workflow_id: Uuid, execution_id: Uuid, user_id: Option<Uuid>, trigger_data: TriggerData) -> Self {
        let mut variables = trigger_data.clone();
        variables.insert("trigger".to_string(), Value::Object(trigger_data.clone()));

        Self {
            workflow_id,
            execution_id,
            user_id,
            trigger_data,
            variables,
            previous_results: Map::new(),
        }
    }

    pub fn trigger_data(&self) -> &Map<String, Value> {
        &self.trigger_data
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn previous_results(&self) -> &Map<String, Value> {
        &self.previous_results
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Expose an action's output to later actions, both as
    /// `previous_results[id]` and as the variable `action_<id>`.
    pub fn record_output(&mut self, action_id: &str, output: Value) {
        self.previous_results.insert(action_id.to_string(), output.clone());
        self.variables.insert(format!("action_{}", action_id), output);
    }
}

/// Result of one workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Results by action id; actions never reached are absent
    pub results: HashMap<String, ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

pub struct WorkflowExecutor {
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    default_timeout: Duration,
}

impl WorkflowExecutor {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: Arc<HandlerRegistry>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            definitions,
            executions,
            registry,
            default_timeout,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute a workflow once for the given trigger data.
    ///
    /// Only a failure to create the execution record is returned as an
    /// error; action failures produce a `failed` run.
    pub async fn run(&self, workflow: &WorkflowDefinition, trigger_data: TriggerData) -> Result<RunResult, EngineError> {
        workflow.validate()?;

        let execution_id = Uuid::new_v4();
        let span = info_span!(
            "workflow_run",
            workflow_id = %workflow.id,
            execution_id = %execution_id,
        );

        self.run_instrumented(workflow, execution_id, trigger_data)
            .instrument(span)
            .await
    }

    async fn run_instrumented(
        &self,
        workflow: &WorkflowDefinition,
        execution_id: Uuid,
        trigger_data: TriggerData,
    ) -> Result<RunResult, EngineError> {
        let start = Instant::now();

        let record = ExecutionRecord::started(execution_id, workflow.id, Value::Object(trigger_data.clone()));
        self.executions.insert_execution(&record).await?;

        info!("Starting workflow '{}' ({} actions)", workflow.name, workflow.actions.len());

        let mut ctx = ExecutionContext::new(workflow.id, execution_id, Some(workflow.owner_id), trigger_data);
        let mut results = HashMap::new();
        let mut failure: Option<String> = None;

        for action in workflow.sorted_actions() {
            if let Some(conditions) = action.conditions.as_deref() {
                if !conditions::evaluate(conditions, ctx.variables()) {
                    info!("Skipping action '{}': conditions not met", action.id);
                    let skipped = ActionResult::skipped();
                    self.log_skip(workflow, &ctx, action).await;
                    results.insert(action.id.clone(), skipped);
                    continue;
                }
            }

            let resolved = action.with_config(templates::resolve(&action.config, &ctx));
            let result = self.execute_action(workflow, &ctx, &resolved).await;

            if let Some(output) = &result.output {
                ctx.record_output(&action.id, output.clone());
            }

            let failed = !result.success;
            if failed {
                let message = result.error.clone().unwrap_or_else(|| "Action failed".to_string());
                warn!("Action '{}' failed, stopping workflow: {}", action.id, message);
                failure = Some(message);
            }
            results.insert(action.id.clone(), result);

            if failed {
                break;
            }
        }

        let status = if failure.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        let duration_ms = start.elapsed().as_millis() as i64;

        let outcome = ExecutionOutcome {
            status,
            completed_at: Utc::now(),
            duration_ms,
            error_message: failure.clone(),
        };
        if let Err(e) = self.executions.finish_execution(execution_id, &outcome).await {
            error!("Failed to update execution record: {}", e);
        }

        match self
            .definitions
            .record_run_outcome(workflow.id, status == ExecutionStatus::Completed)
            .await
        {
            Ok(stats) => info!(
                "Workflow '{}' {} in {}ms (runs: {}, success rate: {}%)",
                workflow.name,
                status.as_str(),
                duration_ms,
                stats.run_count,
                stats.success_rate
            ),
            Err(e) => error!("Failed to update workflow statistics: {}", e),
        }

        Ok(RunResult {
            execution_id,
            workflow_id: workflow.id,
            status,
            results,
            error: failure,
            duration_ms,
        })
    }

    /// Run one resolved action through the retry/timeout controller and
    /// log every attempt.
    async fn execute_action(
        &self,
        workflow: &WorkflowDefinition,
        ctx: &ExecutionContext,
        action: &ActionSpec,
    ) -> ActionResult {
        let Some(handler) = self.registry.get(action.action_type) else {
            warn!("No handler for action '{}' of type {}", action.id, action.type_tag());
            let now = Utc::now();
            let attempt = AttemptRecord {
                attempt: 1,
                started_at: now,
                completed_at: now,
                duration_ms: 0,
                output: None,
                error: Some(UNKNOWN_ACTION_TYPE.to_string()),
            };
            self.log_attempt(workflow, ctx, action, &attempt).await;
            return ActionResult::failure(UNKNOWN_ACTION_TYPE).with_attempts(0);
        };

        info!("Executing action '{}' ({})", action.name, action.action_type);

        let controlled = retry::execute_with_policy(handler.as_ref(), action, ctx, self.default_timeout).await;
        for attempt in &controlled.attempts {
            self.log_attempt(workflow, ctx, action, attempt).await;
        }

        controlled.result
    }

    async fn log_attempt(
        &self,
        workflow: &WorkflowDefinition,
        ctx: &ExecutionContext,
        action: &ActionSpec,
        attempt: &AttemptRecord,
    ) {
        let log = ActionLogRecord {
            id: Uuid::new_v4(),
            execution_id: ctx.execution_id,
            workflow_id: workflow.id,
            action_id: action.id.clone(),
            action_type: action.type_tag().to_string(),
            action_name: action.name.clone(),
            attempt: attempt.attempt as i32,
            status: if attempt.error.is_none() {
                ActionStatus::Succeeded
            } else {
                ActionStatus::Failed
            },
            input: action.config.clone(),
            output: attempt.output.clone(),
            error: attempt.error.clone(),
            duration_ms: attempt.duration_ms,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
        };

        if let Err(e) = self.executions.insert_action_log(&log).await {
            error!("Failed to write action log for '{}': {}", action.id, e);
        }
    }

    async fn log_skip(&self, workflow: &WorkflowDefinition, ctx: &ExecutionContext, action: &ActionSpec) {
        let now = Utc::now();
        let log = ActionLogRecord {
            id: Uuid::new_v4(),
            execution_id: ctx.execution_id,
            workflow_id: workflow.id,
            action_id: action.id.clone(),
            action_type: action.type_tag().to_string(),
            action_name: action.name.clone(),
            attempt: 0,
            status: ActionStatus::Skipped,
            input: action.config.clone(),
            output: Some(serde_json::json!({ "skipped": true })),
            error: None,
            duration_ms: 0,
            started_at: now,
            completed_at: now,
        };

        if let Err(e) = self.executions.insert_action_log(&log).await {
            error!("Failed to write skip log for '{}': {}", action.id, e);
        }
    }
}
