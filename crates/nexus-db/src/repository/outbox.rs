//! # Notification Outbox
//!
//! Rows are written inside the transaction of the state change that
//! triggers them, then handed to the dispatcher by id.
//!
//! ## Row Lifecycle
//! ```text
//!  enqueue_in ──► pending ──claim──► (attempted_at set) ──record_result──► sent
//!      │                                                               └─► failed
//!      └──► skipped   (no consent / no recipient; never attempted)
//! ```
//! `claim` only succeeds once per row, so a row woken twice (startup drain
//! plus channel message) is still attempted exactly once. A repair's channel
//! state follows the newest row for that channel only.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::new_id;
use crate::repository::repair::RepairRepository;
use nexus_core::{
    ChannelState, DeliveryResult, NotificationEntry, NotificationStatus, OutboxDraft, SubjectKind,
};

const ENTRY_COLUMNS: &str = r#"
    id, subject_kind, subject_id, channel, recipient, subject, body, status,
    provider_message_id, error, attempted_at, created_at
"#;

#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Writes a draft. For repairs the matching channel state follows the
    /// row (`pending` or `skipped`).
    pub async fn enqueue_in(conn: &mut SqliteConnection, draft: &OutboxDraft) -> DbResult<NotificationEntry> {
        let entry = NotificationEntry {
            id: new_id(),
            subject_kind: draft.subject_kind,
            subject_id: draft.subject_id.clone(),
            channel: draft.channel,
            recipient: draft.recipient.clone(),
            subject: draft.message.subject.clone(),
            body: draft.message.body.clone(),
            status: draft.initial_status(),
            provider_message_id: None,
            error: None,
            attempted_at: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, subject_kind, subject_id, channel, recipient, subject, body, status,
                provider_message_id, error, attempted_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.subject_kind)
        .bind(&entry.subject_id)
        .bind(entry.channel)
        .bind(&entry.recipient)
        .bind(&entry.subject)
        .bind(&entry.body)
        .bind(entry.status)
        .bind(&entry.provider_message_id)
        .bind(&entry.error)
        .bind(entry.attempted_at)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        if entry.subject_kind == SubjectKind::Repair {
            RepairRepository::set_channel_state_in(
                conn,
                &entry.subject_id,
                entry.channel,
                ChannelState::from(entry.status),
            )
            .await?;
        }

        debug!(
            id = %entry.id,
            subject = %entry.subject_id,
            channel = %entry.channel,
            status = entry.status.as_str(),
            "Outbox entry written"
        );

        Ok(entry)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<NotificationEntry>> {
        let entry = sqlx::query_as::<_, NotificationEntry>(&format!(
            "SELECT {} FROM notification_outbox WHERE id = ?1",
            ENTRY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Marks a pending, never-attempted row as being attempted and returns
    /// it. `None` if it was skipped, already attempted or does not exist.
    pub async fn claim(&self, id: &str) -> DbResult<Option<NotificationEntry>> {
        let claimed = sqlx::query(
            r#"
            UPDATE notification_outbox SET attempted_at = ?2
            WHERE id = ?1 AND status = 'pending' AND attempted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Stores the outcome of the single delivery attempt.
    pub async fn record_result(&self, entry: &NotificationEntry, result: &DeliveryResult) -> DbResult<NotificationEntry> {
        let status = if result.success {
            NotificationStatus::Sent
        } else {
            NotificationStatus::Failed
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE notification_outbox SET
                status = ?2, provider_message_id = ?3, error = ?4
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(&entry.id)
        .bind(status)
        .bind(&result.provider_message_id)
        .bind(&result.error)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "outbox entry {} already has a result",
                entry.id
            )));
        }

        // An older row finishing late must not overwrite the newer request's state.
        if entry.subject_kind == SubjectKind::Repair && Self::is_latest_in(&mut tx, entry).await? {
            RepairRepository::set_channel_state_in(
                &mut tx,
                &entry.subject_id,
                entry.channel,
                ChannelState::from(status),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(NotificationEntry {
            status,
            provider_message_id: result.provider_message_id.clone(),
            error: result.error.clone(),
            ..entry.clone()
        })
    }

    /// Whether `entry` is the last row written for its subject and channel.
    async fn is_latest_in(conn: &mut SqliteConnection, entry: &NotificationEntry) -> DbResult<bool> {
        let latest: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM notification_outbox
            WHERE subject_kind = ?1 AND subject_id = ?2 AND channel = ?3
            ORDER BY rowid DESC
            LIMIT 1
            "#,
        )
        .bind(entry.subject_kind)
        .bind(&entry.subject_id)
        .bind(entry.channel)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(latest.as_deref() == Some(entry.id.as_str()))
    }

    /// Rows written but never attempted, oldest first.
    pub async fn list_pending(&self, limit: u32) -> DbResult<Vec<NotificationEntry>> {
        let entries = sqlx::query_as::<_, NotificationEntry>(&format!(
            r#"
            SELECT {} FROM notification_outbox
            WHERE status = 'pending' AND attempted_at IS NULL
            ORDER BY created_at
            LIMIT ?1
            "#,
            ENTRY_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every row for one repair or sale, newest first.
    pub async fn list_for_subject(&self, kind: SubjectKind, subject_id: &str) -> DbResult<Vec<NotificationEntry>> {
        let entries = sqlx::query_as::<_, NotificationEntry>(&format!(
            r#"
            SELECT {} FROM notification_outbox
            WHERE subject_kind = ?1 AND subject_id = ?2
            ORDER BY created_at DESC, rowid DESC
            "#,
            ENTRY_COLUMNS
        ))
        .bind(kind)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup;
    use nexus_core::{Channel, RenderedMessage};

    fn sale_draft(channel: Channel, recipient: Option<&str>) -> OutboxDraft {
        OutboxDraft {
            subject_kind: SubjectKind::Sale,
            subject_id: "sale-1".into(),
            channel,
            recipient: recipient.map(str::to_string),
            message: RenderedMessage {
                subject: "Your receipt".into(),
                body: "Thanks".into(),
            },
        }
    }

    #[tokio::test]
    async fn test_skipped_rows_are_never_claimed() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let skipped = OutboxRepository::enqueue_in(&mut tx, &sale_draft(Channel::Email, None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(skipped.status, NotificationStatus::Skipped);
        assert!(db.outbox().claim(&skipped.id).await.unwrap().is_none());
        assert!(db.outbox().list_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_once_then_record() {
        let db = setup().await;
        let mut tx = db.begin().await.unwrap();
        let entry = OutboxRepository::enqueue_in(&mut tx, &sale_draft(Channel::WhatsApp, Some("919876543210")))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.outbox().list_pending(10).await.unwrap().len(), 1);

        let claimed = db.outbox().claim(&entry.id).await.unwrap().unwrap();
        assert!(claimed.attempted_at.is_some());
        assert!(db.outbox().claim(&entry.id).await.unwrap().is_none());
        assert!(db.outbox().list_pending(10).await.unwrap().is_empty());

        let done = db
            .outbox()
            .record_result(&claimed, &DeliveryResult::failed("provider down"))
            .await
            .unwrap();
        assert_eq!(done.status, NotificationStatus::Failed);

        let stored = db.outbox().get_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.error.as_deref(), Some("provider down"));

        assert!(db
            .outbox()
            .record_result(&claimed, &DeliveryResult::delivered(None))
            .await
            .is_err());
        assert_eq!(
            db.outbox().list_for_subject(SubjectKind::Sale, "sale-1").await.unwrap().len(),
            1
        );
    }
}
