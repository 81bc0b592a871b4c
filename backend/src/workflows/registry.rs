// Workflow Registry - Maps action types onto handlers

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::actions::{ActionSpec, ActionType};
use super::engine::WorkflowDefinition;
use super::executor::ExecutionContext;
use super::handlers::communication::{Channel, CommunicationHandler, MessageSender};
use super::handlers::control::{ConditionHandler, DelayHandler};
use super::handlers::http::{ApiCallHandler, WebhookHandler};
use super::handlers::records::{RecordHandler, RecordOperation};
use super::store::RecordRepository;
use crate::error::{EngineError, HandlerError};

/// Contract every action handler implements.
///
/// `action.config` is already resolved; handlers never see templates, the
/// retry policy or the executor.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(
        &self,
        action: &ActionSpec,
        ctx: &ExecutionContext,
    ) -> Result<Option<serde_json::Value>, HandlerError>;
}

/// Collaborators the standard handlers delegate to
#[derive(Clone)]
pub struct HandlerDeps {
    pub records: Arc<dyn RecordRepository>,
    pub messages: Arc<dyn MessageSender>,
    pub http: reqwest::Client,
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every known action type
    pub fn standard(deps: HandlerDeps) -> Self {
        let mut registry = Self::new();

        for action_type in ActionType::ALL {
            let handler: Arc<dyn ActionHandler> = match action_type {
                ActionType::SendEmail => Arc::new(CommunicationHandler::new(
                    Channel::Email,
                    deps.messages.clone(),
                    deps.records.clone(),
                )),
                ActionType::SendSms => Arc::new(CommunicationHandler::new(
                    Channel::Sms,
                    deps.messages.clone(),
                    deps.records.clone(),
                )),
                ActionType::SendChat => Arc::new(CommunicationHandler::new(
                    Channel::Chat,
                    deps.messages.clone(),
                    deps.records.clone(),
                )),
                ActionType::CreateRecord => {
                    Arc::new(RecordHandler::new(RecordOperation::Create, deps.records.clone()))
                }
                ActionType::UpdateRecord => {
                    Arc::new(RecordHandler::new(RecordOperation::Update, deps.records.clone()))
                }
                ActionType::CreateTask => {
                    Arc::new(RecordHandler::new(RecordOperation::Task, deps.records.clone()))
                }
                ActionType::CreateNotification => {
                    Arc::new(RecordHandler::new(RecordOperation::Notification, deps.records.clone()))
                }
                ActionType::Delay => Arc::new(DelayHandler),
                ActionType::Condition => Arc::new(ConditionHandler),
                ActionType::ApiCall => Arc::new(ApiCallHandler::new(deps.http.clone())),
                ActionType::Webhook => Arc::new(WebhookHandler::new(deps.http.clone())),
                ActionType::Unknown => continue,
            };
            registry.register(action_type, handler);
        }

        registry
    }

    pub fn register(&mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> &mut Self {
        self.handlers.insert(action_type, handler);
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(action_type, handler);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type).cloned()
    }

    pub fn contains(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Report every action type referenced by `workflows` with no handler
    pub fn validate(&self, workflows: &[WorkflowDefinition]) -> Result<(), EngineError> {
        let missing: BTreeSet<ActionType> = workflows
            .iter()
            .flat_map(|w| w.actions.iter())
            .map(|a| a.action_type)
            .filter(|t| !self.contains(*t))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::UnregisteredActionTypes(missing.into_iter().collect()))
        }
    }
}
