//! Chat delivery through incoming webhooks (Slack and Teams both accept a
//! `{ "text": ... }` body)

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::HandlerError;
use crate::workflows::handlers::communication::{DeliveryReceipt, MessageSender, OutboundMessage};

#[derive(Debug, Clone)]
pub struct ChatWebhook {
    client: reqwest::Client,
    default_webhook_url: Option<String>,
}

impl ChatWebhook {
    pub fn new(client: reqwest::Client, default_webhook_url: Option<String>) -> Self {
        Self {
            client,
            default_webhook_url,
        }
    }

    pub async fn post_message(&self, webhook_url: Option<&str>, channel: &str, text: &str) -> Result<(), HandlerError> {
        let url = webhook_url
            .or(self.default_webhook_url.as_deref())
            .ok_or_else(|| HandlerError::Delivery("no chat webhook configured".to_string()))?;

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": text, "channel": channel }))
            .send()
            .await
            .map_err(|e| HandlerError::Delivery(e.to_string()))?;

        if response.status().is_success() {
            info!("Chat message posted to {}", channel);
            Ok(())
        } else {
            Err(HandlerError::Delivery(format!(
                "chat webhook returned status {}",
                response.status().as_u16()
            )))
        }
    }
}

#[async_trait]
impl MessageSender for ChatWebhook {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, HandlerError> {
        self.post_message(message.webhook_url.as_deref(), &message.to, &message.body)
            .await?;
        Ok(DeliveryReceipt::default())
    }
}
