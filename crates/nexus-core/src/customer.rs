//! # Customers
//!
//! A customer is identified for deduplication by email OR phone. Sale and
//! repair intake both accept a [`CustomerRef`]: either the id of an existing
//! customer or an inline profile that is resolved with find-or-create.
//!
//! ```text
//! ┌───────────────────────────┐      ┌──────────────────────────────────┐
//! │ "customer": "c0ffee-..."  │ ───► │ CustomerRef::ById   → get by id  │
//! └───────────────────────────┘      └──────────────────────────────────┘
//! ┌───────────────────────────┐      ┌──────────────────────────────────┐
//! │ "customer": {             │      │ CustomerRef::Inline              │
//! │   "name": "Ravi",         │ ───► │   → match email OR phone         │
//! │   "phone": "98765 43210"  │      │   → merge fields / create        │
//! │ }                         │      └──────────────────────────────────┘
//! └───────────────────────────┘
//! ```
//!
//! Resolution happens once at the API boundary; everything downstream
//! works with a concrete [`Customer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::contact::{clean_email, clean_phone};
use crate::error::{ValidationError, ValidationErrors};
use crate::money::Money;
use crate::types::Address;
use crate::validation::{validate_email, validate_optional_text, validate_person_name, validate_phone};
use crate::LOYALTY_POINT_UNIT_CENTS;

// =============================================================================
// Customer
// =============================================================================

/// A customer record. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    /// Lower-cased email. Unique among customers.
    pub email: Option<String>,
    /// Digits-only phone. Unique among customers.
    pub phone: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub address: Address,
    pub loyalty_points: i64,
    /// Lifetime spend in minor units.
    pub total_purchases_cents: i64,
    /// Customer-level consent for sale receipts over WhatsApp/email.
    pub notifications_opt_in: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Builds a new customer from a validated, normalised profile.
    pub fn from_profile(id: String, profile: &CustomerProfile, now: DateTime<Utc>) -> Self {
        Customer {
            id,
            name: profile.name.clone().unwrap_or_default(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            loyalty_points: 0,
            total_purchases_cents: 0,
            notifications_opt_in: profile.notifications_opt_in.unwrap_or(false),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_purchases(&self) -> Money {
        Money::from_cents(self.total_purchases_cents)
    }
}

/// Loyalty points earned on a sale: one point per 100 currency units,
/// floor-divided. Negative totals earn nothing.
///
/// ```rust
/// use nexus_core::customer::loyalty_points_for;
/// use nexus_core::Money;
///
/// assert_eq!(loyalty_points_for(Money::from_cents(88_499_82)), 884);
/// assert_eq!(loyalty_points_for(Money::from_cents(9_999)), 0);
/// ```
pub fn loyalty_points_for(total: Money) -> i64 {
    if total.is_negative() {
        return 0;
    }
    total.cents() / LOYALTY_POINT_UNIT_CENTS
}

// =============================================================================
// Customer Profile (input)
// =============================================================================

/// Customer fields as supplied by staff. Every field is optional so the
/// same shape serves create, update and inline intake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub notifications_opt_in: Option<bool>,
}

impl CustomerProfile {
    /// Trims the name and normalises email/phone; blank values become `None`.
    pub fn normalized(&self) -> CustomerProfile {
        CustomerProfile {
            name: self
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            email: clean_email(self.email.as_deref()),
            phone: clean_phone(self.phone.as_deref()),
            address: self.address.clone(),
            notifications_opt_in: self.notifications_opt_in,
        }
    }

    /// Field checks. `require_name` is set on create paths.
    pub fn validate(&self, require_name: bool) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self.name.as_deref() {
            Some(name) => errors.check(validate_person_name("name", name)),
            None if require_name => errors.push(ValidationError::required("name")),
            None => {}
        }

        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            errors.check(validate_email("email", email));
        }

        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            errors.check(validate_phone("phone", phone));
        }

        errors.check(validate_optional_text("address.address_line", self.address.address_line.as_deref(), 300));
        errors.check(validate_optional_text("address.city", self.address.city.as_deref(), 100));
        errors.check(validate_optional_text("address.state", self.address.state.as_deref(), 100));
        errors.check(validate_optional_text("address.postal_code", self.address.postal_code.as_deref(), 20));

        errors.into_result()
    }

    /// Dedup lookups need at least one contact key.
    pub fn require_contact(&self) -> Result<(), ValidationError> {
        let has_email = self.email.as_deref().is_some_and(|e| !e.trim().is_empty());
        let has_phone = self.phone.as_deref().is_some_and(|p| !p.trim().is_empty());

        if has_email || has_phone {
            Ok(())
        } else {
            Err(ValidationError::required("email or phone"))
        }
    }

    /// Copies every supplied field onto `customer`. Returns whether anything
    /// changed. Expects a normalised profile.
    pub fn merge_into(&self, customer: &mut Customer) -> bool {
        let mut changed = false;

        if let Some(name) = &self.name {
            if &customer.name != name {
                customer.name = name.clone();
                changed = true;
            }
        }

        if self.email.is_some() && customer.email != self.email {
            customer.email = self.email.clone();
            changed = true;
        }

        if self.phone.is_some() && customer.phone != self.phone {
            customer.phone = self.phone.clone();
            changed = true;
        }

        if !self.address.is_empty() {
            let before = customer.address.clone();
            customer.address.merge_from(&self.address);
            changed |= before != customer.address;
        }

        if let Some(opt_in) = self.notifications_opt_in {
            if customer.notifications_opt_in != opt_in {
                customer.notifications_opt_in = opt_in;
                changed = true;
            }
        }

        changed
    }
}

// =============================================================================
// Customer Reference
// =============================================================================

/// How a sale or repair names its customer.
///
/// ## JSON
/// ```json
/// "customer": "5d0f..."                          // ById
/// "customer": { "name": "Ravi", "phone": "..." } // Inline
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum CustomerRef {
    ById(String),
    Inline(CustomerProfile),
}

// =============================================================================
// Unit Tests
// =============================================================================
