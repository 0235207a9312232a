//! Best-effort outbound messages.
//!
//! Delivery never decides the outcome of an operation: the stored secret is
//! the source of truth, and a user who missed a message can ask again.

use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), NotifyError>;
}

/// Outcome of a fire-and-forget send. Callers may log it; nothing depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

/// Send `message`, swallowing failures and slow providers.
pub async fn deliver(notifier: &dyn Notifier, message: OutboundMessage, timeout: Duration) -> Delivery {
    match tokio::time::timeout(timeout, notifier.send(&message)).await {
        Ok(Ok(())) => Delivery::Sent,
        Ok(Err(e)) => {
            tracing::warn!(to = %message.to_email, subject = %message.subject, error = %e, "notification not delivered");
            Delivery::Failed(e.0)
        }
        Err(_) => {
            tracing::warn!(to = %message.to_email, subject = %message.subject, "notification timed out");
            Delivery::Failed("timed out".to_string())
        }
    }
}

/// Writes messages to the log instead of delivering them (development mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<(), NotifyError> {
        tracing::info!(to = %message.to_email, subject = %message.subject, "outbound message (log mode)");
        tracing::debug!(body = %message.text, "outbound message body");
        Ok(())
    }
}

pub fn otp_message(to_email: &str, to_name: Option<&str>, code: &str, ttl_minutes: i64) -> OutboundMessage {
    OutboundMessage {
        to_email: to_email.to_string(),
        to_name: to_name.map(str::to_string),
        subject: "Your Food Rescue OTP Code".to_string(),
        text: format!(
            "Your OTP code is: {code}\n\n\
             This code will expire in {ttl_minutes} minutes.\n\
             If you did not request this, you can ignore this email."
        ),
    }
}

pub fn reset_message(to_email: &str, to_name: Option<&str>, token: &str, ttl_minutes: i64) -> OutboundMessage {
    OutboundMessage {
        to_email: to_email.to_string(),
        to_name: to_name.map(str::to_string),
        subject: "Reset your Food Rescue password".to_string(),
        text: format!(
            "Use this token to choose a new password:\n\n{token}\n\n\
             It expires in {ttl_minutes} minutes and works once.\n\
             If you did not request a reset, you can ignore this email."
        ),
    }
}
