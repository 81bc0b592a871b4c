use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use tracing::{error, info};

use crate::config::SmtpConfig;
use crate::error::HandlerError;
use crate::workflows::handlers::communication::{DeliveryReceipt, MessageSender, OutboundMessage};

/// SMTP delivery for send_email actions
#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        let from = format!("{} <{}>", smtp_config.from_name, smtp_config.from_email).parse::<Mailbox>()?;

        Ok(EmailService { transport, from })
    }

    /// Send a plain-text email, returning the relay's reply as the message id
    pub async fn send_email(&self, to_email: &str, subject: &str, body: &str) -> Result<Option<String>, HandlerError> {
        let to = to_email
            .parse::<Mailbox>()
            .map_err(|e| HandlerError::config(format!("invalid recipient '{}': {}", to_email, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| HandlerError::Delivery(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(response) => {
                info!("Email sent to {}", to_email);
                Ok(response.message().next().map(|line| line.to_string()))
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(HandlerError::Delivery(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl MessageSender for EmailService {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, HandlerError> {
        let subject = message.subject.as_deref().unwrap_or_default();
        let provider_message_id = self.send_email(&message.to, subject, &message.body).await?;
        Ok(DeliveryReceipt { provider_message_id })
    }
}
