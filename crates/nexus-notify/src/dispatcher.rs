//! # Notification Dispatcher
//!
//! Background task that delivers outbox rows.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  API transaction commits (repair transition / sale)                    │
//! │       │                                                                 │
//! │       │  handle.enqueue(entry_id)          ◄── never awaits delivery   │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Dispatcher task                                                │   │
//! │  │                                                                 │   │
//! │  │  startup: drain rows still pending and never attempted         │   │
//! │  │                                                                 │   │
//! │  │  loop:                                                          │   │
//! │  │    Deliver(id) → claim → channel.deliver → record_result       │   │
//! │  │    Shutdown    → ack and stop                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  One attempt per row. A failed row stays failed until someone          │
//! │  re-triggers the notification, which writes a new row.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use nexus_core::NotificationEntry;
use nexus_db::Database;

use crate::channel::ChannelSet;
use crate::error::{NotifyError, NotifyResult};

/// Rows drained per startup pass.
const DRAIN_BATCH: u32 = 500;

/// Queue depth between the API and the dispatcher.
const QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
enum DispatchCommand {
    Deliver(String),
    Shutdown(oneshot::Sender<()>),
}

// =============================================================================
// Handle
// =============================================================================

/// Cheap, cloneable handle to the dispatcher task.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    cmd_tx: mpsc::Sender<DispatchCommand>,
}

impl DispatcherHandle {
    /// Queues outbox entries for delivery. Never blocks on the provider; a
    /// full queue or a stopped dispatcher is logged and the rows are picked
    /// up by the next startup drain.
    pub fn enqueue<I, S>(&self, entry_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in entry_ids {
            let id = id.into();
            if let Err(e) = self.cmd_tx.try_send(DispatchCommand::Deliver(id.clone())) {
                warn!(entry = %id, error = %e, "Could not queue notification");
            }
        }
    }

    /// Stops the task after every delivery queued before this call.
    pub async fn shutdown(&self) -> NotifyResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(DispatchCommand::Shutdown(ack_tx))
            .await
            .map_err(|_| NotifyError::ChannelClosed)?;
        ack_rx.await.map_err(|_| NotifyError::ChannelClosed)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct Dispatcher {
    db: Database,
    channels: ChannelSet,
}

impl Dispatcher {
    pub fn new(db: Database, channels: ChannelSet) -> Self {
        Dispatcher { db, channels }
    }

    /// Spawns the task and returns its handle.
    pub fn start(self) -> DispatcherHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(QUEUE_CAPACITY);

        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        DispatcherHandle { cmd_tx }
    }

    async fn run(self, mut cmd_rx: mpsc::Receiver<DispatchCommand>) {
        info!("Notification dispatcher started");

        match self.drain_pending().await {
            Ok(0) => {}
            Ok(count) => info!(count, "Delivered notifications left pending"),
            Err(e) => error!(error = %e, "Failed to drain pending notifications"),
        }

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                DispatchCommand::Deliver(id) => {
                    if let Err(e) = self.deliver(&id).await {
                        error!(entry = %id, error = %e, "Notification dispatch failed");
                    }
                }
                DispatchCommand::Shutdown(ack) => {
                    info!("Notification dispatcher shutting down");
                    let _ = ack.send(());
                    return;
                }
            }
        }

        info!("Notification dispatcher stopped (all handles dropped)");
    }

    /// Attempts every pending, never-attempted row. Returns how many were
    /// attempted.
    pub async fn drain_pending(&self) -> NotifyResult<usize> {
        let pending = self.db.outbox().list_pending(DRAIN_BATCH).await?;
        let mut attempted = 0;

        for entry in pending {
            if self.deliver(&entry.id).await?.is_some() {
                attempted += 1;
            }
        }

        Ok(attempted)
    }

    /// Makes the single delivery attempt for one row. `None` when the row
    /// was skipped, already attempted, or unknown.
    pub async fn deliver(&self, entry_id: &str) -> NotifyResult<Option<NotificationEntry>> {
        let Some(entry) = self.db.outbox().claim(entry_id).await? else {
            debug!(entry = %entry_id, "Nothing to deliver");
            return Ok(None);
        };

        let Some(recipient) = entry.recipient.as_deref() else {
            warn!(entry = %entry.id, "Pending notification without recipient");
            return Ok(None);
        };

        let channel = self.channels.get(entry.channel);
        let result = channel.deliver(recipient, &entry.message()).await;
        let recorded = self.db.outbox().record_result(&entry, &result).await?;

        if result.success {
            info!(
                entry = %recorded.id,
                subject = %recorded.subject_id,
                channel = %recorded.channel,
                provider = channel.name(),
                provider_message_id = ?recorded.provider_message_id,
                "Notification sent"
            );
        } else {
            warn!(
                entry = %recorded.id,
                subject = %recorded.subject_id,
                channel = %recorded.channel,
                provider = channel.name(),
                error = ?recorded.error,
                "Notification failed"
            );
        }

        Ok(Some(recorded))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nexus_core::{Channel, NotificationStatus, OutboxDraft, RenderedMessage, SubjectKind};
    use nexus_db::{DbConfig, OutboxRepository};

    use crate::channel::MockChannel;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn write(db: &Database, channel: Channel, recipient: Option<&str>) -> NotificationEntry {
        let draft = OutboxDraft {
            subject_kind: SubjectKind::Sale,
            subject_id: "sale-1".into(),
            channel,
            recipient: recipient.map(str::to_string),
            message: RenderedMessage {
                subject: "Your receipt".into(),
                body: "Total: Rs 1,18,000.00".into(),
            },
        };
        let mut tx = db.begin().await.unwrap();
        let entry = OutboxRepository::enqueue_in(&mut tx, &draft).await.unwrap();
        tx.commit().await.unwrap();
        entry
    }

    #[tokio::test]
    async fn test_deliver_records_sent_and_failed() {
        let db = setup().await;
        let whatsapp = Arc::new(MockChannel::new());
        let email = Arc::new(MockChannel::failing("mailbox full"));
        let dispatcher = Dispatcher::new(db.clone(), ChannelSet::new(whatsapp.clone(), email.clone()));

        let wa = write(&db, Channel::WhatsApp, Some("919876543210")).await;
        let em = write(&db, Channel::Email, Some("ravi@example.com")).await;

        let sent = dispatcher.deliver(&wa.id).await.unwrap().unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        assert_eq!(sent.provider_message_id.as_deref(), Some("mock-1"));

        let failed = dispatcher.deliver(&em.id).await.unwrap().unwrap();
        assert_eq!(failed.status, NotificationStatus::Failed);

        // Exactly one attempt each.
        assert!(dispatcher.deliver(&wa.id).await.unwrap().is_none());
        assert!(dispatcher.deliver(&em.id).await.unwrap().is_none());
        assert_eq!(whatsapp.sent().await.len(), 1);
        assert_eq!(email.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_skipped_rows_are_not_sent() {
        let db = setup().await;
        let email = Arc::new(MockChannel::new());
        let dispatcher = Dispatcher::new(db.clone(), ChannelSet::new(Arc::new(MockChannel::new()), email.clone()));

        let skipped = write(&db, Channel::Email, None).await;
        assert!(dispatcher.deliver(&skipped.id).await.unwrap().is_none());
        assert!(email.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_task_drains_on_start_and_processes_queue() {
        let db = setup().await;
        let whatsapp = Arc::new(MockChannel::new());
        let channels = ChannelSet::new(whatsapp.clone(), Arc::new(MockChannel::new()));

        let before_start = write(&db, Channel::WhatsApp, Some("919800000001")).await;
        let handle = Dispatcher::new(db.clone(), channels).start();

        let queued = write(&db, Channel::WhatsApp, Some("919800000002")).await;
        handle.enqueue([queued.id.clone()]);
        handle.shutdown().await.unwrap();

        for id in [&before_start.id, &queued.id] {
            let row = db.outbox().get_by_id(id).await.unwrap().unwrap();
            assert_eq!(row.status, NotificationStatus::Sent);
        }
        assert_eq!(whatsapp.sent().await.len(), 2);
    }
}
