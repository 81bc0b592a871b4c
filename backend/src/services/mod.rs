// Delivery providers behind the communication actions

pub mod chat;
pub mod email;
pub mod messaging;
pub mod sms;

pub use chat::ChatWebhook;
pub use email::EmailService;
pub use messaging::MessagingService;
pub use sms::SmsGateway;
