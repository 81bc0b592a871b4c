use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{ChatWebhook, EmailService, SmsGateway};
use crate::config::Config;
use crate::error::HandlerError;
use crate::workflows::handlers::communication::{Channel, DeliveryReceipt, MessageSender, OutboundMessage};

/// Routes each outbound message to the provider for its channel
#[derive(Clone, Default)]
pub struct MessagingService {
    email: Option<Arc<dyn MessageSender>>,
    sms: Option<Arc<dyn MessageSender>>,
    chat: Option<Arc<dyn MessageSender>>,
}

impl MessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire up whichever providers the environment configures
    pub fn from_config(config: &Config, client: reqwest::Client) -> anyhow::Result<Self> {
        let mut service = Self::new();

        if config.smtp.is_configured() {
            service = service.with_email(Arc::new(EmailService::new(&config.smtp)?));
        } else {
            warn!("SMTP not configured; send_email actions will fail");
        }

        match &config.sms {
            Some(sms) if sms.is_configured() => {
                service = service.with_sms(Arc::new(SmsGateway::new(client.clone(), sms.clone())));
            }
            _ => warn!("SMS gateway not configured; send_sms actions will fail"),
        }

        // Chat can still work with per-action webhook urls
        let default_url = config.chat.as_ref().map(|c| c.default_webhook_url.clone());
        service = service.with_chat(Arc::new(ChatWebhook::new(client, default_url)));

        Ok(service)
    }

    pub fn with_email(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.email = Some(sender);
        self
    }

    pub fn with_sms(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sms = Some(sender);
        self
    }

    pub fn with_chat(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.chat = Some(sender);
        self
    }

    fn sender_for(&self, channel: Channel) -> Option<&Arc<dyn MessageSender>> {
        match channel {
            Channel::Email => self.email.as_ref(),
            Channel::Sms => self.sms.as_ref(),
            Channel::Chat => self.chat.as_ref(),
        }
    }
}

#[async_trait]
impl MessageSender for MessagingService {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, HandlerError> {
        let sender = self
            .sender_for(message.channel)
            .ok_or_else(|| HandlerError::Delivery(format!("{} delivery is not configured", message.channel.as_str())))?;

        sender.send(message).await
    }
}
