// Communication handlers - send_email, send_sms, send_chat

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{first_str, required_str};
use crate::error::HandlerError;
use crate::workflows::actions::ActionSpec;
use crate::workflows::executor::ExecutionContext;
use crate::workflows::registry::ActionHandler;
use crate::workflows::store::RecordRepository;

pub const COMMUNICATION_LOG_ENTITY: &str = "communication_logs";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Chat => "chat",
        }
    }
}

/// A message ready to hand to a delivery provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub channel: Channel,
    /// Email address, phone number or chat channel name
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    /// Per-message chat webhook, overriding the configured one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeliveryReceipt {
    pub provider_message_id: Option<String>,
}

/// Outbound delivery collaborator (SMTP relay, SMS gateway, chat webhook)
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, HandlerError>;
}

pub struct CommunicationHandler {
    channel: Channel,
    sender: Arc<dyn MessageSender>,
    records: Arc<dyn RecordRepository>,
}

impl CommunicationHandler {
    pub fn new(channel: Channel, sender: Arc<dyn MessageSender>, records: Arc<dyn RecordRepository>) -> Self {
        Self {
            channel,
            sender,
            records,
        }
    }

    /// Build the outbound message from a resolved action config
    pub fn message_from_config(&self, config: &Value) -> Result<OutboundMessage, HandlerError> {
        let message = match self.channel {
            Channel::Email => OutboundMessage {
                channel: Channel::Email,
                to: required_str(config, "to")?.to_string(),
                subject: Some(first_str(config, &["subject"]).unwrap_or_default().to_string()),
                body: first_str(config, &["body", "message"])
                    .ok_or_else(|| HandlerError::missing("body"))?
                    .to_string(),
                webhook_url: None,
            },
            Channel::Sms => OutboundMessage {
                channel: Channel::Sms,
                to: required_str(config, "to")?.to_string(),
                subject: None,
                body: first_str(config, &["message", "body"])
                    .ok_or_else(|| HandlerError::missing("message"))?
                    .to_string(),
                webhook_url: None,
            },
            Channel::Chat => OutboundMessage {
                channel: Channel::Chat,
                to: first_str(config, &["channel", "to"]).unwrap_or("default").to_string(),
                subject: None,
                body: first_str(config, &["message", "text", "body"])
                    .ok_or_else(|| HandlerError::missing("message"))?
                    .to_string(),
                webhook_url: first_str(config, &["webhook_url"]).map(str::to_string),
            },
        };

        Ok(message)
    }
}

#[async_trait]
impl ActionHandler for CommunicationHandler {
    async fn execute(&self, action: &ActionSpec, ctx: &ExecutionContext) -> Result<Option<Value>, HandlerError> {
        let message = self.message_from_config(&action.config)?;
        let receipt = self.sender.send(&message).await?;

        info!("Sent {} message to {}", self.channel.as_str(), message.to);

        // The message is out; a failed audit write must not fail the action
        let log = json!({
            "channel": self.channel.as_str(),
            "recipient": message.to,
            "subject": message.subject,
            "body": message.body,
            "provider_message_id": receipt.provider_message_id,
            "workflow_id": ctx.workflow_id,
            "execution_id": ctx.execution_id,
            "action_id": action.id,
        });
        if let Err(e) = self.records.create_record(COMMUNICATION_LOG_ENTITY, ctx.user_id, log).await {
            warn!("Failed to write communication log for action '{}': {}", action.id, e);
        }

        Ok(Some(json!({
            "channel": self.channel.as_str(),
            "recipient": message.to,
            "provider_message_id": receipt.provider_message_id,
        })))
    }
}
