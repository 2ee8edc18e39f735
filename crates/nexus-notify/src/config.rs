//! # Provider Configuration
//!
//! Embedded under `[notifications]` in the API config file. A channel that
//! is disabled (or enabled with missing credentials rejected by
//! [`NotificationsConfig::validate`]) falls back to the log channel.
//!
//! ```toml
//! [notifications.whatsapp]
//! enabled = true
//! account_sid = "AC..."
//! auth_token = "..."
//! from_number = "14155238886"
//!
//! [notifications.email]
//! enabled = true
//! smtp_host = "smtp.example.com"
//! username = "crm@example.com"
//! password = "..."
//! from_address = "crm@example.com"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, NotifyResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub whatsapp: WhatsAppConfig,
    pub email: EmailConfig,
}

impl NotificationsConfig {
    pub fn validate(&self) -> NotifyResult<()> {
        self.whatsapp.validate()?;
        self.email.validate()
    }
}

/// Twilio-style messaging API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number, digits only.
    pub from_number: String,
    /// Prefixed to 10-digit local numbers.
    pub default_country_code: String,
    pub timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        WhatsAppConfig {
            enabled: false,
            api_base_url: "https://api.twilio.com".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            default_country_code: "91".to_string(),
            timeout_secs: 10,
        }
    }
}

impl WhatsAppConfig {
    pub fn validate(&self) -> NotifyResult<()> {
        if !self.enabled {
            return Ok(());
        }
        for (name, value) in [
            ("account_sid", &self.account_sid),
            ("auth_token", &self.auth_token),
            ("from_number", &self.from_number),
        ] {
            if value.trim().is_empty() {
                return Err(NotifyError::InvalidConfig(format!(
                    "notifications.whatsapp.{} is required when enabled",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            from_name: "Nexus Laptops".to_string(),
        }
    }
}

impl EmailConfig {
    pub fn validate(&self) -> NotifyResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.smtp_host.trim().is_empty() {
            return Err(NotifyError::InvalidConfig(
                "notifications.email.smtp_host is required when enabled".into(),
            ));
        }
        if !self.from_address.contains('@') {
            return Err(NotifyError::InvalidConfig(
                "notifications.email.from_address must be an email address".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_channels_need_nothing() {
        assert!(NotificationsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_enabled_whatsapp_requires_credentials() {
        let config = NotificationsConfig {
            whatsapp: WhatsAppConfig {
                enabled: true,
                account_sid: "AC123".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth_token"));
    }

    #[test]
    fn test_enabled_email_requires_sender() {
        let email = EmailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            from_address: "not-an-address".into(),
            ..Default::default()
        };
        assert!(email.validate().is_err());
    }
}
