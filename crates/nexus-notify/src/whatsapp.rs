//! # WhatsApp Channel
//!
//! Posts to a Twilio-style messages endpoint:
//!
//! ```text
//! POST {api_base_url}/2010-04-01/Accounts/{sid}/Messages.json
//! Authorization: Basic sid:token
//! From=whatsapp:+14155238886&To=whatsapp:+919876543210&Body=...
//!
//! 201 {"sid": "SM..."}            → delivered, provider id = sid
//! 4xx/5xx {"message": "..."}      → NotifyError::Provider
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use nexus_core::contact::normalize_phone;
use nexus_core::RenderedMessage;

use crate::channel::NotificationChannel;
use crate::config::WhatsAppConfig;
use crate::error::{NotifyError, NotifyResult};

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

pub struct WhatsAppChannel {
    client: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppChannel {
    pub fn new(config: WhatsAppConfig) -> NotifyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(WhatsAppChannel { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// `whatsapp:+<country><number>` from a stored digits-only phone.
    pub fn address(&self, phone: &str) -> NotifyResult<String> {
        let digits = normalize_phone(phone);
        let full = match digits.len() {
            10 => format!("{}{}", self.config.default_country_code, digits),
            11..=15 => digits,
            _ => {
                return Err(NotifyError::InvalidAddress {
                    address: phone.to_string(),
                    reason: "expected 10 to 15 digits".into(),
                })
            }
        };
        Ok(format!("whatsapp:+{}", full))
    }
}

#[async_trait]
impl NotificationChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, recipient: &str, message: &RenderedMessage) -> NotifyResult<Option<String>> {
        let to = self.address(recipient)?;
        let from = format!("whatsapp:+{}", normalize_phone(&self.config.from_number));

        debug!(to = %to, "Sending WhatsApp message");

        let response = self
            .client
            .post(self.endpoint())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", message.body.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| status.to_string());
            return Err(NotifyError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessageResponse = response.json().await?;
        Ok(body.sid)
    }
}
