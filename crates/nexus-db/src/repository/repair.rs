//! # Repair Repository
//!
//! Repair tickets and their append-only notes log.
//!
//! ## Status Writes
//! ```text
//! plan = repair.plan_transition(target, note, now)   (nexus-core, pure)
//!        │
//!        ▼
//! apply_transition_in(tx, repair, plan)
//!   UPDATE repairs SET status = :to ... WHERE id = :id AND status = :from
//!   INSERT INTO repair_notes ...  (one per plan note)
//!        │
//!        ▼
//! outbox rows in the same transaction (OutboxRepository::enqueue_in)
//! ```
//! The `status = :from` guard makes a concurrent transition lose instead of
//! silently overwriting.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::new_id;
use nexus_core::contact::{normalize_email, normalize_phone};
use nexus_core::notification::Channel;
use nexus_core::repair::TransitionPlan;
use nexus_core::{ChannelState, Repair, RepairNote, RepairStatus};

const REPAIR_COLUMNS: &str = r#"
    id, ticket_number, customer_id, store_id,
    device_type, brand, model, serial_number,
    issue_description, diagnosis,
    parts_cost_cents, labor_cost_cents, total_cost_cents,
    priority, status, received_at, estimated_completion, actual_completion,
    consent_whatsapp, consent_email, contact_phone, contact_email,
    whatsapp_state, email_state, is_active, created_at, updated_at
"#;

/// Filters for [`RepairRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct RepairFilter {
    pub store_id: Option<String>,
    pub status: Option<RepairStatus>,
    pub customer_id: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct RepairRepository {
    pool: SqlitePool,
}

impl RepairRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RepairRepository { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a repair together with any notes it already carries.
    pub async fn insert_in(conn: &mut SqliteConnection, repair: &Repair) -> DbResult<()> {
        debug!(id = %repair.id, ticket = %repair.ticket_number, "Inserting repair");

        sqlx::query(
            r#"
            INSERT INTO repairs (
                id, ticket_number, customer_id, store_id,
                device_type, brand, model, serial_number,
                issue_description, diagnosis,
                parts_cost_cents, labor_cost_cents, total_cost_cents,
                priority, status, received_at, estimated_completion, actual_completion,
                consent_whatsapp, consent_email, contact_phone, contact_email,
                whatsapp_state, email_state, is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
            )
            "#,
        )
        .bind(&repair.id)
        .bind(&repair.ticket_number)
        .bind(&repair.customer_id)
        .bind(&repair.store_id)
        .bind(&repair.device.device_type)
        .bind(&repair.device.brand)
        .bind(&repair.device.model)
        .bind(&repair.device.serial_number)
        .bind(&repair.issue_description)
        .bind(&repair.diagnosis)
        .bind(repair.cost.parts_cost_cents)
        .bind(repair.cost.labor_cost_cents)
        .bind(repair.cost.total_cost_cents)
        .bind(repair.priority)
        .bind(repair.status)
        .bind(repair.received_at)
        .bind(repair.estimated_completion)
        .bind(repair.actual_completion)
        .bind(repair.consent.whatsapp)
        .bind(repair.consent.email)
        .bind(&repair.contact.phone)
        .bind(&repair.contact.email)
        .bind(repair.whatsapp_state)
        .bind(repair.email_state)
        .bind(repair.is_active)
        .bind(repair.created_at)
        .bind(repair.updated_at)
        .execute(&mut *conn)
        .await?;

        for note in &repair.notes {
            Self::insert_note_in(conn, note).await?;
        }

        Ok(())
    }

    async fn insert_note_in(conn: &mut SqliteConnection, note: &RepairNote) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO repair_notes (id, repair_id, note, author, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&note.id)
        .bind(&note.repair_id)
        .bind(&note.note)
        .bind(&note.author)
        .bind(note.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Appends a note. Closed repairs still accept notes.
    pub async fn add_note_in(
        conn: &mut SqliteConnection,
        repair_id: &str,
        note: &str,
        author: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<RepairNote> {
        let note = RepairNote {
            id: new_id(),
            repair_id: repair_id.to_string(),
            note: note.trim().to_string(),
            author: author.map(str::to_string),
            created_at: at,
        };
        Self::insert_note_in(conn, &note).await?;
        Ok(note)
    }

    /// Appends a note in its own transaction.
    pub async fn add_note(&self, repair_id: &str, note: &str, author: Option<&str>) -> DbResult<RepairNote> {
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE repairs SET updated_at = ?2 WHERE id = ?1 AND is_active = 1")
            .bind(repair_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(DbError::not_found("Repair", repair_id));
        }

        let note = Self::add_note_in(&mut tx, repair_id, note, author, Utc::now()).await?;
        tx.commit().await?;
        Ok(note)
    }

    /// Writes editable details of an open repair.
    pub async fn update_details(&self, repair: &Repair) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE repairs SET
                issue_description = ?2, diagnosis = ?3,
                parts_cost_cents = ?4, labor_cost_cents = ?5, total_cost_cents = ?6,
                priority = ?7, estimated_completion = ?8,
                consent_whatsapp = ?9, consent_email = ?10,
                contact_phone = ?11, contact_email = ?12,
                updated_at = ?13
            WHERE id = ?1 AND is_active = 1 AND status NOT IN ('delivered', 'cancelled')
            "#,
        )
        .bind(&repair.id)
        .bind(&repair.issue_description)
        .bind(&repair.diagnosis)
        .bind(repair.cost.parts_cost_cents)
        .bind(repair.cost.labor_cost_cents)
        .bind(repair.cost.total_cost_cents)
        .bind(repair.priority)
        .bind(repair.estimated_completion)
        .bind(repair.consent.whatsapp)
        .bind(repair.consent.email)
        .bind(&repair.contact.phone)
        .bind(&repair.contact.email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "repair {} was closed or removed concurrently",
                repair.ticket_number
            )));
        }

        Ok(())
    }

    /// Applies a planned status change, conditional on the status it was
    /// planned from. Notes are authored by `author`.
    pub async fn apply_transition_in(
        conn: &mut SqliteConnection,
        repair_id: &str,
        plan: &TransitionPlan,
        author: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let channel_state = plan.reset_channels.then_some(ChannelState::Pending);

        let result = sqlx::query(
            r#"
            UPDATE repairs SET
                status = ?3,
                actual_completion = COALESCE(?4, actual_completion),
                whatsapp_state = COALESCE(?5, whatsapp_state),
                email_state = COALESCE(?5, email_state),
                updated_at = ?6
            WHERE id = ?1 AND status = ?2 AND is_active = 1
            "#,
        )
        .bind(repair_id)
        .bind(plan.from)
        .bind(plan.to)
        .bind(plan.actual_completion)
        .bind(channel_state)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "repair {} is no longer {}",
                repair_id, plan.from
            )));
        }

        for text in &plan.notes {
            Self::add_note_in(conn, repair_id, text, author, now).await?;
        }

        Ok(())
    }

    /// Sets one channel's delivery state.
    pub async fn set_channel_state_in(
        conn: &mut SqliteConnection,
        repair_id: &str,
        channel: Channel,
        state: ChannelState,
    ) -> DbResult<()> {
        let sql = match channel {
            Channel::WhatsApp => "UPDATE repairs SET whatsapp_state = ?2 WHERE id = ?1",
            Channel::Email => "UPDATE repairs SET email_state = ?2 WHERE id = ?1",
        };

        sqlx::query(sql)
            .bind(repair_id)
            .bind(state)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Loads a repair with its notes (oldest first).
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Repair>> {
        let repair = sqlx::query_as::<_, Repair>(&format!(
            "SELECT {} FROM repairs WHERE id = ?1 AND is_active = 1",
            REPAIR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(mut repair) = repair else {
            return Ok(None);
        };

        repair.notes = sqlx::query_as::<_, RepairNote>(
            r#"
            SELECT id, repair_id, note, author, created_at
            FROM repair_notes WHERE repair_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(repair))
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Repair>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Most recently received first. Notes are not loaded.
    pub async fn list(&self, filter: &RepairFilter) -> DbResult<Vec<Repair>> {
        let limit = if filter.limit == 0 { 100 } else { filter.limit };

        let repairs = sqlx::query_as::<_, Repair>(&format!(
            r#"
            SELECT {} FROM repairs
            WHERE is_active = 1
              AND (?1 IS NULL OR store_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR customer_id = ?3)
            ORDER BY received_at DESC
            LIMIT ?4
            "#,
            REPAIR_COLUMNS
        ))
        .bind(&filter.store_id)
        .bind(filter.status)
        .bind(&filter.customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(repairs)
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Repair>> {
        self.list(&RepairFilter {
            customer_id: Some(customer_id.to_string()),
            limit: 500,
            ..Default::default()
        })
        .await
    }

    /// Public tracking lookup. Every supplied filter must match:
    ///
    /// - `ticket`: exact, case-insensitive
    /// - `phone`: digits substring of the override phone or customer phone
    /// - `email`: case-folded exact match on override or customer email
    ///
    /// Filters that normalise to nothing are ignored.
    pub async fn find_by_ticket_or_contact(
        &self,
        ticket: Option<&str>,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> DbResult<Vec<Repair>> {
        let ticket = ticket
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty());
        let phone = phone.map(normalize_phone).filter(|p| !p.is_empty());
        let email = email.map(normalize_email).filter(|e| !e.is_empty());

        let repairs = sqlx::query_as::<_, Repair>(&format!(
            r#"
            SELECT {} FROM repairs
            WHERE id IN (
                SELECT r.id FROM repairs r
                JOIN customers c ON c.id = r.customer_id
                WHERE r.is_active = 1
                  AND (?1 IS NULL OR UPPER(r.ticket_number) = ?1)
                  AND (?2 IS NULL
                       OR instr(COALESCE(r.contact_phone, ''), ?2) > 0
                       OR instr(COALESCE(c.phone, ''), ?2) > 0)
                  AND (?3 IS NULL OR r.contact_email = ?3 OR c.email = ?3)
            )
            ORDER BY received_at DESC
            LIMIT 50
            "#,
            REPAIR_COLUMNS
        ))
        .bind(&ticket)
        .bind(&phone)
        .bind(&email)
        .fetch_all(&self.pool)
        .await?;

        Ok(repairs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, setup, store};
    use crate::Database;
    use crate::repository::outbox::OutboxRepository;
    use nexus_core::{
        ContactOverride, DeliveryResult, DeviceInfo, NotificationConsent, NotificationStatus, OutboxDraft,
        RenderedMessage, RepairCost, RepairPriority, SubjectKind,
    };

    async fn seeded_repair(db: &Database, contact_phone: Option<&str>) -> Repair {
        let s = store(db, "BLR01").await;
        let c = customer(db, "owner@example.com").await;
        let now = Utc::now();
        let id = new_id();

        let repair = Repair {
            id: id.clone(),
            ticket_number: "R-20260131-9F8E7D".into(),
            customer_id: c.id,
            store_id: s.id,
            device: DeviceInfo {
                device_type: "laptop".into(),
                brand: Some("Dell".into()),
                model: Some("XPS 13".into()),
                serial_number: None,
            },
            issue_description: "No display".into(),
            diagnosis: None,
            cost: RepairCost::new(0, 0),
            priority: RepairPriority::High,
            status: RepairStatus::Received,
            received_at: now,
            estimated_completion: None,
            actual_completion: None,
            consent: NotificationConsent::default(),
            contact: ContactOverride {
                phone: contact_phone.map(str::to_string),
                email: None,
            },
            whatsapp_state: ChannelState::Idle,
            email_state: ChannelState::Idle,
            is_active: true,
            created_at: now,
            updated_at: now,
            notes: vec![RepairNote {
                id: new_id(),
                repair_id: id,
                note: "Left charger with device".into(),
                author: None,
                created_at: now,
            }],
        };

        let mut tx = db.begin().await.unwrap();
        RepairRepository::insert_in(&mut tx, &repair).await.unwrap();
        tx.commit().await.unwrap();
        repair
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let db = setup().await;
        let repair = seeded_repair(&db, None).await;

        let loaded = db.repairs().get_by_id(&repair.id).await.unwrap().unwrap();
        assert_eq!(loaded.ticket_number, repair.ticket_number);
        assert_eq!(loaded.device.brand.as_deref(), Some("Dell"));
        assert_eq!(loaded.priority, RepairPriority::High);
        assert_eq!(loaded.whatsapp_state, ChannelState::Idle);
        assert!(loaded.consent.whatsapp && loaded.consent.email);
        assert_eq!(loaded.notes.len(), 1);
    }

    #[tokio::test]
    async fn test_late_result_of_older_message_keeps_newer_state() {
        let db = setup().await;
        let repair = seeded_repair(&db, Some("9876543210")).await;
        let draft = |body: &str| OutboxDraft {
            subject_kind: SubjectKind::Repair,
            subject_id: repair.id.clone(),
            channel: Channel::WhatsApp,
            recipient: Some("919876543210".into()),
            message: RenderedMessage {
                subject: "Repair update".into(),
                body: body.into(),
            },
        };

        let mut tx = db.begin().await.unwrap();
        let older = OutboxRepository::enqueue_in(&mut tx, &draft("In progress")).await.unwrap();
        let newer = OutboxRepository::enqueue_in(&mut tx, &draft("Ready for pickup")).await.unwrap();
        tx.commit().await.unwrap();

        let outbox = db.outbox();
        let newer = outbox.claim(&newer.id).await.unwrap().unwrap();
        let older = outbox.claim(&older.id).await.unwrap().unwrap();
        outbox
            .record_result(&newer, &DeliveryResult::delivered(Some("wamid-2".into())))
            .await
            .unwrap();
        outbox
            .record_result(&older, &DeliveryResult::failed("timeout"))
            .await
            .unwrap();

        let loaded = db.repairs().get_by_id(&repair.id).await.unwrap().unwrap();
        assert_eq!(loaded.whatsapp_state, ChannelState::Sent);
        assert_eq!(loaded.email_state, ChannelState::Idle);
        let stored = outbox.get_by_id(&older.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
    }

    #[tokio::test]
    async fn test_transition_guarded_by_current_status() {
        let db = setup().await;
        let repair = seeded_repair(&db, None).await;
        let now = Utc::now();

        let plan = repair
            .plan_transition(RepairStatus::Delivered, Some("Paid in cash"), now)
            .unwrap();
        let mut tx = db.begin().await.unwrap();
        RepairRepository::apply_transition_in(&mut tx, &repair.id, &plan, Some("staff-1"), now)
            .await
            .unwrap();

        // Planned from the same stale snapshot: loses.
        let stale = RepairRepository::apply_transition_in(&mut tx, &repair.id, &plan, None, now).await;
        assert!(matches!(stale, Err(DbError::TransactionFailed(_))));
        tx.commit().await.unwrap();

        let loaded = db.repairs().get_by_id(&repair.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RepairStatus::Delivered);
        assert!(loaded.actual_completion.is_some());
        assert_eq!(loaded.whatsapp_state, ChannelState::Pending);
        assert_eq!(loaded.email_state, ChannelState::Pending);
        let notes: Vec<&str> = loaded.notes.iter().map(|n| n.note.as_str()).collect();
        assert_eq!(
            notes,
            vec![
                "Left charger with device",
                "Status changed from received to delivered",
                "Paid in cash",
                "Device delivered to customer",
            ]
        );
    }

    #[tokio::test]
    async fn test_find_by_contact_phone_substring() {
        let db = setup().await;
        let repair = seeded_repair(&db, Some("9876543210")).await;

        let found = db
            .repairs()
            .find_by_ticket_or_contact(None, Some("98765-43210"), None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, repair.id);

        let by_ticket = db
            .repairs()
            .find_by_ticket_or_contact(Some("r-20260131-9f8e7d"), None, None)
            .await
            .unwrap();
        assert_eq!(by_ticket.len(), 1);

        let by_customer_email = db
            .repairs()
            .find_by_ticket_or_contact(None, None, Some("OWNER@example.com"))
            .await
            .unwrap();
        assert_eq!(by_customer_email.len(), 1);

        // Filters are combined.
        let mismatch = db
            .repairs()
            .find_by_ticket_or_contact(Some("R-20260131-9F8E7D"), Some("1111111111"), None)
            .await
            .unwrap();
        assert!(mismatch.is_empty());
    }

    #[tokio::test]
    async fn test_update_details_rejected_when_closed() {
        let db = setup().await;
        let mut repair = seeded_repair(&db, None).await;
        repair.diagnosis = Some("Cracked hinge".into());
        db.repairs().update_details(&repair).await.unwrap();

        let now = Utc::now();
        let plan = repair.plan_transition(RepairStatus::Cancelled, None, now).unwrap();
        let mut tx = db.begin().await.unwrap();
        RepairRepository::apply_transition_in(&mut tx, &repair.id, &plan, None, now)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(db.repairs().update_details(&repair).await.is_err());
        // Notes still allowed.
        db.repairs().add_note(&repair.id, "Customer called", None).await.unwrap();
        assert!(db.repairs().add_note("missing", "x", None).await.is_err());
    }
}
