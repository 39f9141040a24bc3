//! Outbound email. Delivery runs as tracked background work, never on the request path.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// Templates every mailer knows how to render.
pub const TEMPLATES: &[&str] = &["user_welcome"];

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub template: String,
    pub data: Value,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError>;
}

/// Dev mailer that logs the payload instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailerError> {
        if !TEMPLATES.contains(&message.template.as_str()) {
            return Err(MailerError::UnknownTemplate(message.template));
        }
        info!(
            recipient = %message.recipient,
            template = %message.template,
            data = %message.data,
            "email send stub"
        );
        Ok(())
    }
}
