// Workflow Automation Engine
//
// Executes user-defined workflows: a trigger plus an ordered list of typed
// actions with templated configuration, conditions, retries and an audit trail.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod executor;
pub mod handlers;
pub mod registry;
pub mod retry;
pub mod store;
pub mod templates;
pub mod triggers;

pub use actions::{ActionResult, ActionSpec, ActionType, RetryPolicy};
pub use conditions::{Condition, ConditionLogic, ConditionOperator};
pub use engine::{WorkflowDefinition, WorkflowEngine};
pub use executor::{ExecutionContext, RunResult, WorkflowExecutor};
pub use registry::{ActionHandler, HandlerDeps, HandlerRegistry};
pub use store::{DefinitionStore, ExecutionStore, InMemoryStore, PgWorkflowStore, RecordRepository};
pub use triggers::{TriggerData, TriggerEvent, TriggerType};
