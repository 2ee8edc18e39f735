//! # nexus-notify: Customer Notifications
//!
//! Delivers the rows that repair transitions and completed sales write to
//! the notification outbox.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          nexus-notify                                   │
//! │                                                                         │
//! │  ┌────────────────┐   ┌──────────────────┐   ┌────────────────────┐    │
//! │  │DispatcherHandle│──►│   Dispatcher     │──►│    ChannelSet      │    │
//! │  │ (in AppState)  │   │  claim → send →  │   │ WhatsApp │ Email   │    │
//! │  └────────────────┘   │  record_result   │   │ (or LogChannel)    │    │
//! │                       └────────┬─────────┘   └────────────────────┘    │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                       notification_outbox (nexus-db)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let channels = ChannelSet::from_config(&config.notifications)?;
//! let handle = Dispatcher::new(db.clone(), channels).start();
//!
//! // after the state-change transaction commits
//! handle.enqueue(entry_ids);
//!
//! // on shutdown
//! handle.shutdown().await?;
//! ```

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod email;
pub mod error;
pub mod whatsapp;

pub use channel::{ChannelSet, LogChannel, MockChannel, NotificationChannel};
pub use config::{EmailConfig, NotificationsConfig, WhatsAppConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use email::EmailChannel;
pub use error::{NotifyError, NotifyResult};
pub use whatsapp::WhatsAppChannel;
