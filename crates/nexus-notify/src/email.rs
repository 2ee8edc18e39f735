//! # Email Channel
//!
//! Plain-text mail over SMTP (STARTTLS relay) using lettre's async
//! transport.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use nexus_core::RenderedMessage;

use crate::channel::NotificationChannel;
use crate::config::EmailConfig;
use crate::error::{NotifyError, NotifyResult};

pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> NotifyResult<Self> {
        let from = parse_mailbox(&format!("{} <{}>", config.from_name, config.from_address))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::InvalidConfig(format!("SMTP relay error: {}", e)))?
            .port(config.smtp_port);

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(EmailChannel {
            transport: builder.build(),
            from,
        })
    }
}

fn parse_mailbox(address: &str) -> NotifyResult<Mailbox> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Builds the message without sending it.
pub fn build_message(from: &Mailbox, recipient: &str, message: &RenderedMessage) -> NotifyResult<Message> {
    Message::builder()
        .from(from.clone())
        .to(parse_mailbox(recipient)?)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|e| NotifyError::Transport(format!("Failed to build email: {}", e)))
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> NotifyResult<Option<String>> {
        let email = build_message(&self.from, recipient, message)?;

        debug!(to = %recipient, "Sending email");

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(response.first_line().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let from = parse_mailbox("Nexus <crm@example.com>").unwrap();
        let message = RenderedMessage {
            subject: "Receipt".into(),
            body: "Thanks".into(),
        };

        assert!(build_message(&from, "ravi@example.com", &message).is_ok());
        assert!(matches!(
            build_message(&from, "not an address", &message),
            Err(NotifyError::InvalidAddress { .. })
        ));
    }
}
