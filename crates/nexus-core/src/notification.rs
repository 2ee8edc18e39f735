//! # Notifications
//!
//! Message templates, recipient resolution and the outbox entry type.
//! Nothing here talks to a provider; `nexus-notify` does the sending.
//!
//! ## Recipient Resolution
//! ```text
//! consent for channel? ──no──► skipped
//!        │yes
//!        ▼
//! override contact? ──yes──► use override
//!        │no
//!        ▼
//! customer profile contact? ──yes──► use profile
//!        │no
//!        ▼
//!     skipped
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::customer::Customer;
use crate::repair::{ChannelState, ContactOverride, NotificationConsent, Repair, RepairStatus};
use crate::sale::{Sale, SaleStatus};

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    WhatsApp,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::WhatsApp, Channel::Email];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::WhatsApp => "whatsapp",
            Channel::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    /// Written, not yet attempted.
    Pending,
    Sent,
    Failed,
    /// No consent or no recipient; never attempted.
    Skipped,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Skipped => "skipped",
        }
    }
}

/// A repair's per-channel state mirrors the latest outbox row for it.
impl From<NotificationStatus> for ChannelState {
    fn from(status: NotificationStatus) -> Self {
        match status {
            NotificationStatus::Pending => ChannelState::Pending,
            NotificationStatus::Sent => ChannelState::Sent,
            NotificationStatus::Failed => ChannelState::Failed,
            NotificationStatus::Skipped => ChannelState::Skipped,
        }
    }
}

/// What an outbox entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Repair,
    Sale,
}

// =============================================================================
// Messages
// =============================================================================

/// A message ready to hand to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RenderedMessage {
    /// Used as the email subject. WhatsApp ignores it.
    pub subject: String,
    pub body: String,
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(provider_message_id: Option<String>) -> Self {
        DeliveryResult {
            success: true,
            provider_message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        DeliveryResult {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

/// A row of the notification outbox.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct NotificationEntry {
    pub id: String,
    pub subject_kind: SubjectKind,
    pub subject_id: String,
    pub channel: Channel,
    pub recipient: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    #[ts(as = "Option<String>")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl NotificationEntry {
    pub fn message(&self) -> RenderedMessage {
        RenderedMessage {
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }
}

/// An outbox row before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxDraft {
    pub subject_kind: SubjectKind,
    pub subject_id: String,
    pub channel: Channel,
    /// `None` means the row is written as `skipped`.
    pub recipient: Option<String>,
    pub message: RenderedMessage,
}

impl OutboxDraft {
    pub fn initial_status(&self) -> NotificationStatus {
        if self.recipient.is_some() {
            NotificationStatus::Pending
        } else {
            NotificationStatus::Skipped
        }
    }
}

// =============================================================================
// Recipient Resolution
// =============================================================================

fn profile_contact(channel: Channel, customer: &Customer) -> Option<String> {
    match channel {
        Channel::WhatsApp => customer.phone.clone(),
        Channel::Email => customer.email.clone(),
    }
}

/// Recipient for a repair notification, or `None` when it must be skipped.
pub fn resolve_repair_recipient(
    channel: Channel,
    consent: &NotificationConsent,
    contact: &ContactOverride,
    customer: &Customer,
) -> Option<String> {
    let (allowed, override_contact) = match channel {
        Channel::WhatsApp => (consent.whatsapp, contact.phone.as_ref()),
        Channel::Email => (consent.email, contact.email.as_ref()),
    };

    if !allowed {
        return None;
    }

    override_contact
        .cloned()
        .or_else(|| profile_contact(channel, customer))
        .filter(|r| !r.trim().is_empty())
}

/// Recipient for a sale receipt. Gated on the customer-level opt-in.
pub fn resolve_sale_recipient(channel: Channel, customer: &Customer) -> Option<String> {
    if !customer.notifications_opt_in {
        return None;
    }
    profile_contact(channel, customer).filter(|r| !r.trim().is_empty())
}

// =============================================================================
// Templates
// =============================================================================

fn device_label(repair: &Repair) -> String {
    let parts: Vec<&str> = [repair.device.brand.as_deref(), repair.device.model.as_deref()]
        .into_iter()
        .flatten()
        .collect();

    if parts.is_empty() {
        repair.device.device_type.clone()
    } else {
        parts.join(" ")
    }
}

pub fn render_repair_ready(repair: &Repair, customer: &Customer, store_name: &str) -> RenderedMessage {
    RenderedMessage {
        subject: format!("Your device is ready for pickup ({})", repair.ticket_number),
        body: format!(
            "Hello {},\n\nYour {} (ticket {}) has been repaired and is ready for pickup at {}.\n\
             Amount payable: {}.\n\nThank you for choosing us.",
            customer.name,
            device_label(repair),
            repair.ticket_number,
            store_name,
            repair.cost.total(),
        ),
    }
}

pub fn render_repair_delivered(repair: &Repair, customer: &Customer, store_name: &str) -> RenderedMessage {
    RenderedMessage {
        subject: format!("Repair {} delivered", repair.ticket_number),
        body: format!(
            "Hello {},\n\nYour {} (ticket {}) has been handed over at {}.\n\
             If anything is not right, reply to this message or visit the store.",
            customer.name,
            device_label(repair),
            repair.ticket_number,
            store_name,
        ),
    }
}

pub fn render_sale_receipt(sale: &Sale, customer: &Customer, store_name: &str) -> RenderedMessage {
    let mut body = format!(
        "Hello {},\n\nThank you for shopping at {}.\nReceipt: {}\n\n",
        customer.name, store_name, sale.receipt_number
    );

    for item in &sale.items {
        body.push_str(&format!(
            "{} x {} = {}\n",
            item.quantity,
            item.name_snapshot,
            crate::Money::from_cents(item.line_total_cents)
        ));
    }

    body.push_str(&format!(
        "\nSubtotal: {}\nTax: {}\nTotal: {}\n",
        crate::Money::from_cents(sale.subtotal_cents),
        crate::Money::from_cents(sale.tax_cents),
        sale.total(),
    ));

    RenderedMessage {
        subject: format!("Your receipt {}", sale.receipt_number),
        body,
    }
}

// =============================================================================
// Outbox Planning
// =============================================================================

/// Outbox rows for a repair entering `status`, one per channel.
pub fn plan_repair_notifications(
    repair: &Repair,
    status: RepairStatus,
    customer: &Customer,
    store_name: &str,
) -> Vec<OutboxDraft> {
    let message = match status {
        RepairStatus::ReadyForPickup => render_repair_ready(repair, customer, store_name),
        RepairStatus::Delivered => render_repair_delivered(repair, customer, store_name),
        _ => return Vec::new(),
    };

    Channel::ALL
        .into_iter()
        .map(|channel| OutboxDraft {
            subject_kind: SubjectKind::Repair,
            subject_id: repair.id.clone(),
            channel,
            recipient: resolve_repair_recipient(channel, &repair.consent, &repair.contact, customer),
            message: message.clone(),
        })
        .collect()
}

/// Receipt rows for a completed sale. Nothing for other statuses.
pub fn plan_sale_receipt(sale: &Sale, customer: &Customer, store_name: &str) -> Vec<OutboxDraft> {
    if sale.status != SaleStatus::Completed {
        return Vec::new();
    }

    let message = render_sale_receipt(sale, customer, store_name);
    Channel::ALL
        .into_iter()
        .map(|channel| OutboxDraft {
            subject_kind: SubjectKind::Sale,
            subject_id: sale.id.clone(),
            channel,
            recipient: resolve_sale_recipient(channel, customer),
            message: message.clone(),
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::CustomerProfile;
    use crate::repair::{ChannelState, DeviceInfo, RepairCost, RepairPriority};

    fn customer(opt_in: bool) -> Customer {
        let profile = CustomerProfile {
            name: Some("Meera".into()),
            email: Some("meera@example.com".into()),
            phone: Some("9876543210".into()),
            notifications_opt_in: Some(opt_in),
            ..Default::default()
        };
        Customer::from_profile("c1".into(), &profile, Utc::now())
    }

    fn repair(consent: NotificationConsent, contact: ContactOverride) -> Repair {
        let now = Utc::now();
        Repair {
            id: "r1".into(),
            ticket_number: "R-20260101-ABCDEF".into(),
            customer_id: "c1".into(),
            store_id: "s1".into(),
            device: DeviceInfo {
                device_type: "laptop".into(),
                brand: Some("HP".into()),
                model: Some("Pavilion 15".into()),
                serial_number: None,
            },
            issue_description: "Keyboard".into(),
            diagnosis: None,
            cost: RepairCost::new(2_000_00, 500_00),
            priority: RepairPriority::Low,
            status: RepairStatus::InRepair,
            received_at: now,
            estimated_completion: None,
            actual_completion: None,
            consent,
            contact,
            whatsapp_state: ChannelState::Idle,
            email_state: ChannelState::Idle,
            is_active: true,
            created_at: now,
            updated_at: now,
            notes: vec![],
        }
    }

    #[test]
    fn test_override_takes_precedence() {
        let contact = ContactOverride {
            phone: Some("9000000001".into()),
            email: None,
        };
        let c = customer(false);
        let consent = NotificationConsent::default();

        assert_eq!(
            resolve_repair_recipient(Channel::WhatsApp, &consent, &contact, &c).as_deref(),
            Some("9000000001")
        );
        assert_eq!(
            resolve_repair_recipient(Channel::Email, &consent, &contact, &c).as_deref(),
            Some("meera@example.com")
        );
    }

    #[test]
    fn test_no_consent_skips() {
        let consent = NotificationConsent {
            whatsapp: false,
            email: true,
        };
        let r = repair(consent, ContactOverride::default());
        let drafts = plan_repair_notifications(&r, RepairStatus::ReadyForPickup, &customer(true), "Koramangala");

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].channel, Channel::WhatsApp);
        assert_eq!(drafts[0].initial_status(), NotificationStatus::Skipped);
        assert_eq!(drafts[1].initial_status(), NotificationStatus::Pending);
        assert!(drafts[1].message.body.contains("HP Pavilion 15"));
        assert!(drafts[1].message.body.contains("₹2500.00"));
    }

    #[test]
    fn test_no_drafts_for_quiet_statuses() {
        let r = repair(NotificationConsent::default(), ContactOverride::default());
        assert!(plan_repair_notifications(&r, RepairStatus::Diagnosed, &customer(true), "X").is_empty());
    }

    #[test]
    fn test_sale_receipt_needs_opt_in() {
        let c = customer(false);
        assert_eq!(resolve_sale_recipient(Channel::Email, &c), None);
        let c = customer(true);
        assert_eq!(resolve_sale_recipient(Channel::WhatsApp, &c).as_deref(), Some("9876543210"));
    }

    #[test]
    fn test_channel_serde_names() {
        assert_eq!(serde_json::to_string(&Channel::WhatsApp).unwrap(), r#""whatsapp""#);
        assert_eq!(NotificationStatus::Skipped.as_str(), "skipped");
    }
}
