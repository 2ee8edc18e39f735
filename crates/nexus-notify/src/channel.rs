//! # Notification Channels
//!
//! One trait, one implementation per provider:
//!
//! ```text
//! ┌────────────────────────┬────────────────────────────────────────────────┐
//! │ WhatsAppChannel        │ HTTP form post to a Twilio-style messaging API │
//! │ EmailChannel           │ SMTP via lettre                                │
//! │ LogChannel             │ tracing only; used when a provider is off      │
//! │ MockChannel            │ records sends; can be told to fail             │
//! └────────────────────────┴────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use nexus_core::{Channel, DeliveryResult, RenderedMessage};

use crate::config::NotificationsConfig;
use crate::email::EmailChannel;
use crate::error::{NotifyError, NotifyResult};
use crate::whatsapp::WhatsAppChannel;

/// A way of reaching a customer.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Sends one message. Returns the provider's message id, if any.
    async fn send(&self, recipient: &str, message: &RenderedMessage) -> NotifyResult<Option<String>>;

    /// Sends and folds any error into a failed result.
    async fn deliver(&self, recipient: &str, message: &RenderedMessage) -> DeliveryResult {
        match self.send(recipient, message).await {
            Ok(provider_id) => DeliveryResult::delivered(provider_id),
            Err(e) => DeliveryResult::failed(e.to_string()),
        }
    }
}

// =============================================================================
// Log Channel
// =============================================================================

/// Logs the message instead of sending it. Always succeeds.
#[derive(Debug, Clone, Copy)]
pub struct LogChannel {
    channel: Channel,
}

impl LogChannel {
    pub fn new(channel: Channel) -> Self {
        LogChannel { channel }
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> NotifyResult<Option<String>> {
        info!(
            channel = %self.channel,
            recipient = %recipient,
            subject = %message.subject,
            "Notification provider disabled; message logged only"
        );
        Ok(None)
    }
}

// =============================================================================
// Mock Channel
// =============================================================================

/// In-memory channel for tests.
#[derive(Debug, Default)]
pub struct MockChannel {
    sent: Mutex<Vec<(String, RenderedMessage)>>,
    failure: Option<String>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose every send fails with `error`.
    pub fn failing(error: impl Into<String>) -> Self {
        MockChannel {
            sent: Mutex::new(Vec::new()),
            failure: Some(error.into()),
        }
    }

    /// Every attempted send, including failed ones.
    pub async fn sent(&self) -> Vec<(String, RenderedMessage)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> NotifyResult<Option<String>> {
        let mut sent = self.sent.lock().await;
        sent.push((recipient.to_string(), message.clone()));

        match &self.failure {
            Some(error) => Err(NotifyError::Provider {
                status: 503,
                message: error.clone(),
            }),
            None => Ok(Some(format!("mock-{}", sent.len()))),
        }
    }
}

// =============================================================================
// Channel Set
// =============================================================================

/// The channel used for each [`Channel`] kind.
#[derive(Clone)]
pub struct ChannelSet {
    pub whatsapp: Arc<dyn NotificationChannel>,
    pub email: Arc<dyn NotificationChannel>,
}

impl ChannelSet {
    pub fn new(whatsapp: Arc<dyn NotificationChannel>, email: Arc<dyn NotificationChannel>) -> Self {
        ChannelSet { whatsapp, email }
    }

    /// Log-only channels for both kinds.
    pub fn logging() -> Self {
        ChannelSet {
            whatsapp: Arc::new(LogChannel::new(Channel::WhatsApp)),
            email: Arc::new(LogChannel::new(Channel::Email)),
        }
    }

    /// Real providers for enabled channels, log channels for the rest.
    pub fn from_config(config: &NotificationsConfig) -> NotifyResult<Self> {
        config.validate()?;
        let mut set = Self::logging();

        if config.whatsapp.enabled {
            set.whatsapp = Arc::new(WhatsAppChannel::new(config.whatsapp.clone())?);
        }
        if config.email.enabled {
            set.email = Arc::new(EmailChannel::new(&config.email)?);
        }

        info!(
            whatsapp = set.whatsapp.name(),
            email = set.email.name(),
            "Notification channels configured"
        );
        Ok(set)
    }

    pub fn get(&self, channel: Channel) -> &Arc<dyn NotificationChannel> {
        match channel {
            Channel::WhatsApp => &self.whatsapp,
            Channel::Email => &self.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> RenderedMessage {
        RenderedMessage {
            subject: "Ready".into(),
            body: "Your laptop is ready".into(),
        }
    }

    #[tokio::test]
    async fn test_failing_mock_folds_into_result() {
        let channel = MockChannel::failing("quota exceeded");
        let result = channel.deliver("919876543210", &message()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("quota exceeded"));
        assert_eq!(channel.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_log_channel_succeeds_without_id() {
        let result = LogChannel::new(Channel::Email).deliver("a@example.com", &message()).await;
        assert_eq!(result, DeliveryResult::delivered(None));
    }

    #[test]
    fn test_default_config_uses_log_channels() {
        let set = ChannelSet::from_config(&NotificationsConfig::default()).unwrap();
        assert_eq!(set.get(Channel::WhatsApp).name(), "log");
        assert_eq!(set.get(Channel::Email).name(), "log");
    }
}
