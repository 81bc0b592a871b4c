// Record handlers - create_record, update_record, create_task, create_notification

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::{first_str, required_str};
use crate::error::HandlerError;
use crate::workflows::actions::ActionSpec;
use crate::workflows::executor::ExecutionContext;
use crate::workflows::registry::ActionHandler;
use crate::workflows::store::{validate_entity_name, RecordRepository, StoreError};

pub const TASK_ENTITY: &str = "tasks";
pub const NOTIFICATION_ENTITY: &str = "notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOperation {
    Create,
    Update,
    Task,
    Notification,
}

pub struct RecordHandler {
    operation: RecordOperation,
    records: Arc<dyn RecordRepository>,
}

impl RecordHandler {
    pub fn new(operation: RecordOperation, records: Arc<dyn RecordRepository>) -> Self {
        Self { operation, records }
    }
}

fn entity_from(config: &Value) -> Result<&str, HandlerError> {
    let entity = required_str(config, "entity")?;
    validate_entity_name(entity).map_err(|_| HandlerError::config(format!("invalid entity name '{}'", entity)))?;
    Ok(entity)
}

fn object_field(config: &Value, field: &str) -> Result<Map<String, Value>, HandlerError> {
    match config.get(field) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(HandlerError::config(format!("'{}' must be an object", field))),
    }
}

/// Stamp the originating run onto the stored data
fn with_source(mut data: Map<String, Value>, ctx: &ExecutionContext) -> Value {
    data.insert(
        "source".to_string(),
        json!({ "workflow_id": ctx.workflow_id, "execution_id": ctx.execution_id }),
    );
    Value::Object(data)
}

#[async_trait]
impl ActionHandler for RecordHandler {
    async fn execute(&self, action: &ActionSpec, ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let config = &action.config;

        let record = match self.operation {
            RecordOperation::Create => {
                let entity = entity_from(config)?;
                let data = with_source(object_field(config, "data")?, ctx);
                self.records.create_record(entity, ctx.user_id, data).await?
            }
            RecordOperation::Update => {
                let entity = entity_from(config)?;
                let id = required_str(config, "id")?;
                let id = Uuid::parse_str(id)
                    .map_err(|_| HandlerError::config(format!("'{}' is not a valid record id", id)))?;
                let patch = Value::Object(object_field(config, "data")?);
                self.records.update_record(entity, id, patch).await?
            }
            RecordOperation::Task => {
                let mut data = Map::new();
                data.insert("title".to_string(), json!(required_str(config, "title")?));
                data.insert("description".to_string(), json!(first_str(config, &["description"])));
                data.insert("assignee".to_string(), config.get("assignee").cloned().unwrap_or(Value::Null));
                data.insert("due_date".to_string(), config.get("due_date").cloned().unwrap_or(Value::Null));
                data.insert(
                    "priority".to_string(),
                    json!(first_str(config, &["priority"]).unwrap_or("medium")),
                );
                data.insert("status".to_string(), json!("open"));
                self.records
                    .create_record(TASK_ENTITY, ctx.user_id, with_source(data, ctx))
                    .await?
            }
            RecordOperation::Notification => {
                let message = first_str(config, &["message", "title"]).ok_or_else(|| HandlerError::missing("message"))?;
                let recipient = match first_str(config, &["user_id", "recipient"]) {
                    Some(raw) => Some(
                        Uuid::parse_str(raw)
                            .map_err(|_| HandlerError::config(format!("'{}' is not a valid user id", raw)))?,
                    ),
                    None => ctx.user_id,
                };

                let mut data = Map::new();
                data.insert("message".to_string(), json!(message));
                data.insert("title".to_string(), json!(first_str(config, &["title"])));
                data.insert("level".to_string(), json!(first_str(config, &["level"]).unwrap_or("info")));
                data.insert("read".to_string(), json!(false));
                self.records
                    .create_record(NOTIFICATION_ENTITY, recipient, with_source(data, ctx))
                    .await?
            }
        };

        Ok(Some(serde_json::to_value(record).map_err(StoreError::from)?))
    }
}
