//! # Notify Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Configuration  │  Transport        │  Provider         │  Outbox       │
//! │  InvalidConfig  │  Transport        │  Provider{status} │  Database     │
//! │  InvalidAddress │                   │                   │  ChannelClosed│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Channel errors never reach an HTTP response: the dispatcher folds them
//! into a failed `DeliveryResult` and stores that on the outbox row.

use nexus_db::DbError;
use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// A provider is enabled but misconfigured.
    #[error("Invalid notification configuration: {0}")]
    InvalidConfig(String),

    /// Recipient or sender address could not be parsed.
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Network or protocol failure talking to the provider.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with an error.
    #[error("Provider rejected message ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Outbox error: {0}")]
    Database(#[from] DbError),

    /// The dispatcher task is gone.
    #[error("Dispatcher channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Transport(err.to_string())
    }
}
