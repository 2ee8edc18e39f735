//! # Repair Service
//!
//! Intake, status transitions and customer notifications for repair
//! tickets.
//!
//! ```text
//!   received ──► diagnosed ──► in_repair ──► ready_for_pickup ──► delivered
//!      │             │             │                │
//!      └─────────────┴─────────────┴────────────────┴──────────► cancelled
//!
//!   ready_for_pickup, delivered  ──►  outbox rows (WhatsApp + email)
//!                                     written in the transition's transaction
//! ```
//!
//! A transition never waits for a provider. Delivery outcomes land in the
//! repair's per-channel state when the dispatcher gets to them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use nexus_core::contact::{normalize_email, normalize_phone};
use nexus_core::notification::plan_repair_notifications;
use nexus_core::repair::{ticket_number, RepairIntake, RepairUpdate};
use nexus_core::validation::validate_text;
use nexus_core::{
    ChannelState, DeviceInfo, OutboxDraft, Repair, RepairCost, RepairNote, RepairStatus, ValidationError,
};
use nexus_db::{new_id, short_code, Database, DbResult, RepairFilter, RepairRepository};
use nexus_notify::DispatcherHandle;

use crate::auth::AuthUser;
use crate::error::{ApiError, ErrorCode};
use crate::services::customers::CustomerService;
use crate::services::{finish, write_outbox};

/// What `GET /repairs/track/status` reveals to an unauthenticated caller.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedRepair {
    pub ticket_number: String,
    pub status: RepairStatus,
    pub device: DeviceInfo,
    pub received_at: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub actual_completion: Option<DateTime<Utc>>,
}

impl From<Repair> for TrackedRepair {
    fn from(repair: Repair) -> Self {
        TrackedRepair {
            ticket_number: repair.ticket_number,
            status: repair.status,
            device: repair.device,
            received_at: repair.received_at,
            estimated_completion: repair.estimated_completion,
            actual_completion: repair.actual_completion,
        }
    }
}

pub struct RepairService {
    db: Database,
    notifier: DispatcherHandle,
}

impl RepairService {
    pub fn new(db: Database, notifier: DispatcherHandle) -> Self {
        RepairService { db, notifier }
    }

    /// Opens a ticket in `received`.
    pub async fn intake(&self, intake: RepairIntake, user: &AuthUser) -> Result<Repair, ApiError> {
        user.ensure_store(&intake.store_id)?;
        intake.validate()?;

        self.db
            .stores()
            .get_by_id(&intake.store_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Store", &intake.store_id))?;

        let customer = CustomerService::new(self.db.clone())
            .resolve(&intake.customer)
            .await?;

        let now = Utc::now();
        let id = new_id();
        let notes = intake
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|note| RepairNote {
                id: new_id(),
                repair_id: id.clone(),
                note: note.to_string(),
                author: Some(user.user_id.clone()),
                created_at: now,
            })
            .into_iter()
            .collect();

        let repair = Repair {
            id,
            ticket_number: ticket_number(now, &short_code()),
            customer_id: customer.id,
            store_id: intake.store_id.trim().to_string(),
            device: intake.device,
            issue_description: intake.issue_description.trim().to_string(),
            diagnosis: None,
            cost: RepairCost::new(intake.parts_cost_cents, intake.labor_cost_cents),
            priority: intake.priority,
            status: RepairStatus::Received,
            received_at: now,
            estimated_completion: intake.estimated_completion,
            actual_completion: None,
            consent: intake.consent,
            contact: intake.contact.normalized(),
            whatsapp_state: ChannelState::Idle,
            email_state: ChannelState::Idle,
            is_active: true,
            created_at: now,
            updated_at: now,
            notes,
        };

        let mut tx = self.db.begin().await?;
        let result = RepairRepository::insert_in(&mut tx, &repair).await;
        finish(tx, result).await?;

        info!(repair_id = %repair.id, ticket = %repair.ticket_number, "Repair received");
        self.load(&repair.id).await
    }

    /// Moves a repair to `status`.
    ///
    /// The status string is parsed before anything is read, so an unknown
    /// value leaves the repair untouched.
    pub async fn transition(
        &self,
        id: &str,
        status: &str,
        note: Option<&str>,
        user: &AuthUser,
    ) -> Result<Repair, ApiError> {
        let target = RepairStatus::from_str(status)?;
        let repair = self.get(id, user).await?;

        let now = Utc::now();
        let plan = repair.plan_transition(target, note, now)?;

        let drafts = if plan.notify {
            let mut after = repair.clone();
            after.status = target;
            after.actual_completion = plan.actual_completion.or(after.actual_completion);
            self.notification_drafts(&after).await?
        } else {
            Vec::new()
        };

        let mut tx = self.db.begin().await?;
        let result: DbResult<Vec<String>> = async {
            RepairRepository::apply_transition_in(&mut tx, &repair.id, &plan, Some(user.user_id.as_str()), now)
                .await?;
            write_outbox(&mut tx, &drafts).await
        }
        .await;
        let pending = finish(tx, result).await?;

        info!(
            repair_id = %repair.id,
            ticket = %repair.ticket_number,
            from = %plan.from,
            to = %plan.to,
            queued = pending.len(),
            "Repair status changed"
        );

        self.notifier.enqueue(pending);
        self.load(&repair.id).await
    }

    /// Writes a fresh pair of outbox rows for the current status.
    pub async fn notify(&self, id: &str, user: &AuthUser) -> Result<Repair, ApiError> {
        let repair = self.get(id, user).await?;
        if !repair.status.triggers_notification() {
            return Err(ApiError::bad_request(
                ErrorCode::InvalidStatus,
                format!(
                    "Repair {} is {}; notifications are sent for ready_for_pickup and delivered",
                    repair.ticket_number, repair.status
                ),
            ));
        }

        let drafts = self.notification_drafts(&repair).await?;

        let mut tx = self.db.begin().await?;
        let result = write_outbox(&mut tx, &drafts).await;
        let pending = finish(tx, result).await?;

        info!(repair_id = %repair.id, queued = pending.len(), "Repair notification re-triggered");

        self.notifier.enqueue(pending);
        self.load(&repair.id).await
    }

    async fn notification_drafts(&self, repair: &Repair) -> Result<Vec<OutboxDraft>, ApiError> {
        let Some(customer) = self.db.customers().get_by_id(&repair.customer_id).await? else {
            warn!(repair_id = %repair.id, "Customer is gone; no notifications written");
            return Ok(Vec::new());
        };
        let store_name = self
            .db
            .stores()
            .get_by_id(&repair.store_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_default();

        Ok(plan_repair_notifications(repair, repair.status, &customer, &store_name))
    }

    /// Edits details of an open repair.
    pub async fn update(&self, id: &str, update: RepairUpdate, user: &AuthUser) -> Result<Repair, ApiError> {
        let mut repair = self.get(id, user).await?;
        update.apply_to(&mut repair)?;

        self.db.repairs().update_details(&repair).await?;
        self.load(id).await
    }

    /// Appends a note. Closed repairs accept notes too.
    pub async fn add_note(&self, id: &str, note: &str, user: &AuthUser) -> Result<RepairNote, ApiError> {
        validate_text("note", note, 2000)?;
        self.get(id, user).await?;

        Ok(self
            .db
            .repairs()
            .add_note(id, note.trim(), Some(user.user_id.as_str()))
            .await?)
    }

    pub async fn get(&self, id: &str, user: &AuthUser) -> Result<Repair, ApiError> {
        let repair = self.load(id).await?;
        user.ensure_store(&repair.store_id)?;
        Ok(repair)
    }

    pub async fn list(&self, filter: RepairFilter, user: &AuthUser) -> Result<Vec<Repair>, ApiError> {
        let filter = RepairFilter {
            store_id: user.scope_store(filter.store_id)?,
            ..filter
        };
        Ok(self.db.repairs().list(&filter).await?)
    }

    /// Public lookup by ticket number, phone or email. Supplied filters are
    /// combined; at least one must survive normalisation.
    pub async fn track(
        &self,
        ticket: Option<&str>,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<TrackedRepair>, ApiError> {
        let usable = ticket.is_some_and(|t| !t.trim().is_empty())
            || phone.is_some_and(|p| !normalize_phone(p).is_empty())
            || email.is_some_and(|e| !normalize_email(e).is_empty());
        if !usable {
            return Err(ValidationError::required("ticket, phone or email").into());
        }

        let repairs = self
            .db
            .repairs()
            .find_by_ticket_or_contact(ticket, phone, email)
            .await?;

        if repairs.is_empty() {
            return Err(ApiError::new(
                axum::http::StatusCode::NOT_FOUND,
                ErrorCode::NotFound,
                "No repair matches the given details",
            ));
        }

        Ok(repairs.into_iter().map(TrackedRepair::from).collect())
    }

    async fn load(&self, id: &str) -> Result<Repair, ApiError> {
        self.db
            .repairs()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Repair", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
