//! # Repair Tickets
//!
//! The repair state machine. Every status change goes through
//! [`Repair::plan_transition`], which checks the transition table and works
//! out the side effects the persistence layer has to apply atomically.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  received ──► diagnosed ──► in_repair ──► ready_for_pickup ──► delivered│
//! │     │  ▲          │  ▲         │  ▲             │                (final)│
//! │     │  └──────────┴──┴─────────┴──┘ (jumps between open states allowed) │
//! │     │                                           │                       │
//! │     └──────────────────────┬────────────────────┘                       │
//! │                            ▼                                            │
//! │                        cancelled (final)                                │
//! │                                                                         │
//! │  ready_for_pickup, delivered → enqueue WhatsApp + email notifications  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::contact::{clean_email, clean_phone};
use crate::customer::CustomerRef;
use crate::error::{CoreError, CoreResult, ValidationError, ValidationErrors};
use crate::money::Money;
use crate::validation::{
    validate_email, validate_optional_text, validate_phone, validate_price_cents, validate_text,
};

/// Note appended when a device is handed back.
pub const DELIVERED_NOTE: &str = "Device delivered to customer";

// =============================================================================
// Repair Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Received,
    Diagnosed,
    InRepair,
    ReadyForPickup,
    Delivered,
    Cancelled,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 6] = [
        RepairStatus::Received,
        RepairStatus::Diagnosed,
        RepairStatus::InRepair,
        RepairStatus::ReadyForPickup,
        RepairStatus::Delivered,
        RepairStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::Received => "received",
            RepairStatus::Diagnosed => "diagnosed",
            RepairStatus::InRepair => "in_repair",
            RepairStatus::ReadyForPickup => "ready_for_pickup",
            RepairStatus::Delivered => "delivered",
            RepairStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered and cancelled repairs are frozen.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RepairStatus::Delivered | RepairStatus::Cancelled)
    }

    /// Statuses reachable from this one.
    pub fn allowed_next(&self) -> &'static [RepairStatus] {
        if self.is_terminal() {
            &[]
        } else {
            &Self::ALL
        }
    }

    pub fn can_transition_to(&self, target: RepairStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    /// Entering this status notifies the customer.
    #[inline]
    pub fn triggers_notification(&self) -> bool {
        matches!(self, RepairStatus::ReadyForPickup | RepairStatus::Delivered)
    }
}

impl Default for RepairStatus {
    fn default() -> Self {
        RepairStatus::Received
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepairStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        RepairStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| CoreError::InvalidStatus {
                value: s.to_string(),
                allowed: RepairStatus::ALL.map(|st| st.as_str()).join(", "),
            })
    }
}

// =============================================================================
// Priority
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RepairPriority {
    Low,
    #[default]
    Medium,
    High,
}

// =============================================================================
// Notification Channel State
// =============================================================================

/// Delivery state of one channel for a repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// Nothing requested yet.
    #[default]
    #[serde(rename = "none")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "none"))]
    Idle,
    Pending,
    Sent,
    Failed,
    Skipped,
}

// =============================================================================
// Value Objects
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DeviceInfo {
    /// laptop, desktop, tablet...
    pub device_type: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

/// Cost breakdown. `total = parts + labor` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RepairCost {
    pub parts_cost_cents: i64,
    pub labor_cost_cents: i64,
    pub total_cost_cents: i64,
}

impl RepairCost {
    pub fn new(parts_cents: i64, labor_cents: i64) -> Self {
        RepairCost {
            parts_cost_cents: parts_cents,
            labor_cost_cents: labor_cents,
            total_cost_cents: parts_cents + labor_cents,
        }
    }

    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cost_cents)
    }
}

/// Per-repair permission to contact the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NotificationConsent {
    #[cfg_attr(feature = "sqlx", sqlx(rename = "consent_whatsapp"))]
    pub whatsapp: bool,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "consent_email"))]
    pub email: bool,
}

impl Default for NotificationConsent {
    fn default() -> Self {
        NotificationConsent {
            whatsapp: true,
            email: true,
        }
    }
}

/// Contact details that take precedence over the customer profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ContactOverride {
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "contact_phone"))]
    pub phone: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "contact_email"))]
    pub email: Option<String>,
}

impl ContactOverride {
    pub fn normalized(&self) -> ContactOverride {
        ContactOverride {
            phone: clean_phone(self.phone.as_deref()),
            email: clean_email(self.email.as_deref()),
        }
    }

    fn validate(&self, errors: &mut ValidationErrors) {
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            errors.check(validate_phone("contact.phone", phone));
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            errors.check(validate_email("contact.email", email));
        }
    }
}

// =============================================================================
// Repair
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Repair {
    pub id: String,
    /// `R-YYYYMMDD-XXXXXX`
    pub ticket_number: String,
    pub customer_id: String,
    pub store_id: String,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub device: DeviceInfo,
    pub issue_description: String,
    pub diagnosis: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub cost: RepairCost,
    pub priority: RepairPriority,
    pub status: RepairStatus,
    #[ts(as = "String")]
    pub received_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub actual_completion: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub consent: NotificationConsent,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub contact: ContactOverride,
    pub whatsapp_state: ChannelState,
    pub email_state: ChannelState,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub notes: Vec<RepairNote>,
}

/// One entry of the append-only notes log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RepairNote {
    pub id: String,
    pub repair_id: String,
    pub note: String,
    /// Staff user id, or `None` for system notes.
    pub author: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Everything a status change has to write, computed up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    pub from: RepairStatus,
    pub to: RepairStatus,
    /// Notes to append, in order.
    pub notes: Vec<String>,
    pub actual_completion: Option<DateTime<Utc>>,
    /// Both channel states go to `pending`.
    pub reset_channels: bool,
    /// Outbox rows must be written.
    pub notify: bool,
}

impl Repair {
    /// Fails with `RepairClosed` once the repair is delivered or cancelled.
    pub fn ensure_open(&self) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::RepairClosed {
                ticket: self.ticket_number.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Checks a status change and computes its effects.
    pub fn plan_transition(
        &self,
        target: RepairStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<TransitionPlan> {
        self.ensure_open()?;

        if !self.status.can_transition_to(target) {
            return Err(CoreError::InvalidStatusTransition {
                entity: "repair".to_string(),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let mut notes = vec![format!("Status changed from {} to {}", self.status, target)];
        if let Some(extra) = note.map(str::trim).filter(|n| !n.is_empty()) {
            notes.push(extra.to_string());
        }

        let delivered = target == RepairStatus::Delivered;
        if delivered {
            notes.push(DELIVERED_NOTE.to_string());
        }

        Ok(TransitionPlan {
            from: self.status,
            to: target,
            notes,
            actual_completion: delivered.then_some(now),
            reset_channels: delivered,
            notify: target.triggers_notification(),
        })
    }
}

/// Formats a ticket number: `R-YYYYMMDD-XXXXXX`.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use nexus_core::repair::ticket_number;
///
/// let at = Utc.with_ymd_and_hms(2026, 1, 31, 18, 30, 0).unwrap();
/// assert_eq!(ticket_number(at, "9f8e7d"), "R-20260131-9F8E7D");
/// ```
pub fn ticket_number(at: DateTime<Utc>, suffix: &str) -> String {
    format!("R-{}-{}", at.format("%Y%m%d"), suffix.to_uppercase())
}

// =============================================================================
// Intake and Updates (input)
// =============================================================================

/// Body of `POST /repairs`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RepairIntake {
    pub customer: CustomerRef,
    pub store_id: String,
    pub device: DeviceInfo,
    pub issue_description: String,
    #[serde(default)]
    pub priority: RepairPriority,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parts_cost_cents: i64,
    #[serde(default)]
    pub labor_cost_cents: i64,
    #[serde(default)]
    pub consent: NotificationConsent,
    #[serde(default)]
    pub contact: ContactOverride,
    #[serde(default)]
    pub note: Option<String>,
}

impl RepairIntake {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.store_id.trim().is_empty() {
            errors.push(ValidationError::required("store_id"));
        }
        errors.check(validate_text("device.device_type", &self.device.device_type, 50));
        errors.check(validate_optional_text("device.brand", self.device.brand.as_deref(), 100));
        errors.check(validate_optional_text("device.model", self.device.model.as_deref(), 100));
        errors.check(validate_optional_text(
            "device.serial_number",
            self.device.serial_number.as_deref(),
            100,
        ));
        errors.check(validate_text("issue_description", &self.issue_description, 2000));
        errors.check(validate_price_cents("parts_cost_cents", self.parts_cost_cents));
        errors.check(validate_price_cents("labor_cost_cents", self.labor_cost_cents));
        errors.check(validate_optional_text("note", self.note.as_deref(), 2000));
        self.contact.validate(&mut errors);

        errors.into_result()
    }
}

/// Body of `PUT /repairs/:id`. Only supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RepairUpdate {
    #[serde(default)]
    pub issue_description: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub parts_cost_cents: Option<i64>,
    #[serde(default)]
    pub labor_cost_cents: Option<i64>,
    #[serde(default)]
    pub priority: Option<RepairPriority>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consent: Option<NotificationConsent>,
    #[serde(default)]
    pub contact: Option<ContactOverride>,
}

impl RepairUpdate {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(issue) = &self.issue_description {
            errors.check(validate_text("issue_description", issue, 2000));
        }
        errors.check(validate_optional_text("diagnosis", self.diagnosis.as_deref(), 2000));
        if let Some(parts) = self.parts_cost_cents {
            errors.check(validate_price_cents("parts_cost_cents", parts));
        }
        if let Some(labor) = self.labor_cost_cents {
            errors.check(validate_price_cents("labor_cost_cents", labor));
        }
        if let Some(contact) = &self.contact {
            contact.validate(&mut errors);
        }

        errors.into_result()
    }

    /// Applies the update to an open repair; the cost total is recomputed.
    pub fn apply_to(&self, repair: &mut Repair) -> CoreResult<()> {
        repair.ensure_open()?;
        self.validate()?;

        if let Some(issue) = &self.issue_description {
            repair.issue_description = issue.trim().to_string();
        }
        if let Some(diagnosis) = &self.diagnosis {
            repair.diagnosis = Some(diagnosis.trim().to_string()).filter(|d| !d.is_empty());
        }
        if self.parts_cost_cents.is_some() || self.labor_cost_cents.is_some() {
            repair.cost = RepairCost::new(
                self.parts_cost_cents.unwrap_or(repair.cost.parts_cost_cents),
                self.labor_cost_cents.unwrap_or(repair.cost.labor_cost_cents),
            );
        }
        if let Some(priority) = self.priority {
            repair.priority = priority;
        }
        if let Some(eta) = self.estimated_completion {
            repair.estimated_completion = Some(eta);
        }
        if let Some(consent) = self.consent {
            repair.consent = consent;
        }
        if let Some(contact) = &self.contact {
            repair.contact = contact.normalized();
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
