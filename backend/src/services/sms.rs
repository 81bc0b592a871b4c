use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::config::SmsConfig;
use crate::error::HandlerError;
use crate::workflows::handlers::communication::{DeliveryReceipt, MessageSender, OutboundMessage};

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    from: &'a str,
    to: &'a str,
    message: &'a str,
}

/// HTTP SMS gateway client.
///
/// Posts `{ from, to, message }` with a bearer key and reads the provider id
/// from `id` or `message_id` in the response.
#[derive(Debug, Clone)]
pub struct SmsGateway {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsGateway {
    pub fn new(client: reqwest::Client, config: SmsConfig) -> Self {
        Self { client, config }
    }

    pub async fn send_sms(&self, to: &str, message: &str) -> Result<Option<String>, HandlerError> {
        let response = self
            .client
            .post(&self.config.gateway_url)
            .bearer_auth(&self.config.api_key)
            .json(&SmsRequest {
                from: &self.config.from_number,
                to,
                message,
            })
            .send()
            .await
            .map_err(|e| HandlerError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("SMS gateway rejected message to {}: {} {}", to, status, body);
            return Err(HandlerError::Delivery(format!(
                "sms gateway returned status {}",
                status.as_u16()
            )));
        }

        info!("SMS sent to {}", to);

        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok(["id", "message_id"]
            .iter()
            .find_map(|key| body.get(*key))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
    }
}

#[async_trait]
impl MessageSender for SmsGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, HandlerError> {
        let provider_message_id = self.send_sms(&message.to, &message.body).await?;
        Ok(DeliveryReceipt { provider_message_id })
    }
}
