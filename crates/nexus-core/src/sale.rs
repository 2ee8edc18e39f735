//! # Sales
//!
//! Pure rules of the sale lifecycle: line pricing, totals, the status
//! transition table, and refund eligibility.
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   pending ──────► completed ──refund──► partially_refunded ──refund─┐   │
//! │      │               │   └──────refund (full)──────► refunded ◄─────┘   │
//! │      │               │                                  │               │
//! │      └───────────────┴──────────► cancelled ◄───────────┘               │
//! │                                  (terminal, restocks once)              │
//! │                                                                         │
//! │   refunded / partially_refunded are only reached through refunds       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError, ValidationErrors};
use crate::money::Money;
use crate::types::TaxRate;
use crate::validation::{validate_price_cents, validate_quantity};
use crate::MAX_SALE_LINES;

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Recorded, payment not yet confirmed. Stock is already committed.
    Pending,
    /// Paid.
    Completed,
    /// Voided. Stock has been returned.
    Cancelled,
    /// Refunded in full.
    Refunded,
    /// Some money returned, balance still refundable.
    PartiallyRefunded,
}

impl SaleStatus {
    pub const ALL: [SaleStatus; 5] = [
        SaleStatus::Pending,
        SaleStatus::Completed,
        SaleStatus::Cancelled,
        SaleStatus::Refunded,
        SaleStatus::PartiallyRefunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Pending => "pending",
            SaleStatus::Completed => "completed",
            SaleStatus::Cancelled => "cancelled",
            SaleStatus::Refunded => "refunded",
            SaleStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// Statuses that may be requested directly through a status change.
    pub fn allowed_next(&self) -> &'static [SaleStatus] {
        match self {
            SaleStatus::Pending => &[SaleStatus::Completed, SaleStatus::Cancelled],
            SaleStatus::Completed | SaleStatus::PartiallyRefunded | SaleStatus::Refunded => {
                &[SaleStatus::Cancelled]
            }
            SaleStatus::Cancelled => &[],
        }
    }

    /// Money can be returned only from these states.
    #[inline]
    pub fn is_refundable(&self) -> bool {
        matches!(self, SaleStatus::Completed | SaleStatus::PartiallyRefunded)
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Completed
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SaleStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| CoreError::InvalidStatus {
                value: s.to_string(),
                allowed: SaleStatus::ALL.map(|st| st.as_str()).join(", "),
            })
    }
}

/// What a requested status change amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// Target equals current status; nothing to do.
    Unchanged,
    /// Move to `cancelled` and return stock (once).
    Cancel,
    /// Plain status write.
    Update(SaleStatus),
}

/// Checks a requested status change against the transition table.
pub fn plan_status_change(current: SaleStatus, target: SaleStatus) -> CoreResult<StatusChange> {
    if current == target {
        return Ok(StatusChange::Unchanged);
    }

    if !current.allowed_next().contains(&target) {
        return Err(CoreError::InvalidStatusTransition {
            entity: "sale".to_string(),
            from: current.to_string(),
            to: target.to_string(),
        });
    }

    Ok(match target {
        SaleStatus::Cancelled => StatusChange::Cancel,
        other => StatusChange::Update(other),
    })
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    /// Equated monthly instalments through a finance partner.
    Emi,
    BankTransfer,
    Cheque,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Emi => "emi",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cheque => "cheque",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale with its line items and refund history.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// `S-<STORE>-YYYYMMDD-XXXXXX`
    pub receipt_number: String,
    pub customer_id: String,
    pub store_id: String,
    /// Staff member who rang up the sale.
    pub user_id: Option<String>,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    /// Sum of line totals (after line discounts, before tax).
    pub subtotal_cents: i64,
    /// Sum of line discounts, for reporting.
    pub discount_cents: i64,
    pub tax_rate_bps: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub refunded_cents: i64,
    /// Set once the line quantities have been returned to stock.
    pub stock_restored: bool,
    pub notes: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<SaleItem>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub refunds: Vec<Refund>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Money still refundable.
    #[inline]
    pub fn refundable_balance(&self) -> Money {
        Money::from_cents(self.total_cents - self.refunded_cents)
    }

    /// Completed or partially refunded, with a positive balance left.
    pub fn can_be_refunded(&self) -> bool {
        self.status.is_refundable() && self.refunded_cents < self.total_cents
    }

    /// Checks a refund of `amount` and returns the resulting state.
    pub fn plan_refund(&self, amount: Money) -> CoreResult<RefundPlan> {
        if !amount.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "amount_cents".to_string(),
            }
            .into());
        }

        if !self.can_be_refunded() {
            let reason = if self.status.is_refundable() {
                "already fully refunded".to_string()
            } else {
                format!("status is {}", self.status)
            };
            return Err(CoreError::RefundNotAllowed {
                receipt: self.receipt_number.clone(),
                reason,
            });
        }

        let remaining = self.refundable_balance();
        if amount > remaining {
            return Err(CoreError::RefundExceedsBalance {
                requested: amount.cents(),
                remaining: remaining.cents(),
            });
        }

        let refunded_after = Money::from_cents(self.refunded_cents) + amount;
        let status_after = if refunded_after == self.total() {
            SaleStatus::Refunded
        } else {
            SaleStatus::PartiallyRefunded
        };

        Ok(RefundPlan {
            refunded_after,
            status_after,
        })
    }
}

/// Outcome of an accepted refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundPlan {
    pub refunded_after: Money,
    pub status_after: SaleStatus,
}

impl RefundPlan {
    #[inline]
    pub fn is_full(&self) -> bool {
        self.status_after == SaleStatus::Refunded
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line item. Uses the snapshot pattern: SKU, name and price are frozen at
/// sale time so later catalog edits do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    /// unit_price × quantity − discount
    pub line_total_cents: i64,
    /// Position in the original request.
    pub line_no: i64,
}

// =============================================================================
// Refund
// =============================================================================

/// One entry of a sale's refund history.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Refund {
    pub id: String,
    pub sale_id: String,
    pub amount_cents: i64,
    pub reason: String,
    /// Staff user id.
    pub refunded_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Formats a receipt number: `S-<STORE>-YYYYMMDD-XXXXXX`.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use nexus_core::sale::receipt_number;
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap();
/// assert_eq!(receipt_number("blr01", at, "a1b2c3"), "S-BLR01-20260309-A1B2C3");
/// ```
pub fn receipt_number(store_code: &str, at: DateTime<Utc>, suffix: &str) -> String {
    format!(
        "S-{}-{}-{}",
        store_code.trim().to_uppercase(),
        at.format("%Y%m%d"),
        suffix.to_uppercase()
    )
}

// =============================================================================
// Pricing
// =============================================================================

/// A sale line before persistence, with product data already snapshotted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDraft {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
}

impl LineDraft {
    /// unit × qty − discount. The discount may not exceed the gross amount.
    pub fn line_total(&self, index: usize) -> Result<Money, ValidationError> {
        let gross = Money::from_cents(self.unit_price_cents)
            .checked_mul_quantity(self.quantity)
            .ok_or_else(|| ValidationError::invalid(format!("items[{}]", index), "line amount is too large"))?;
        let discount = Money::from_cents(self.discount_cents);

        if discount > gross {
            return Err(ValidationError::OutOfRange {
                field: format!("items[{}].discount_cents", index),
                min: 0,
                max: gross.cents(),
            });
        }

        Ok(gross - discount)
    }
}

/// Computed money fields of a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleTotals {
    pub line_totals: Vec<Money>,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

/// Validates every line and computes subtotal, flat-rate tax and total.
///
/// ## Example
/// ```rust
/// use nexus_core::sale::{compute_totals, LineDraft};
/// use nexus_core::TaxRate;
///
/// let lines = vec![LineDraft {
///     product_id: "p1".into(),
///     sku: "LAP-1".into(),
///     name: "Laptop".into(),
///     quantity: 2,
///     unit_price_cents: 50_000_00,
///     discount_cents: 1_000_00,
/// }];
/// let totals = compute_totals(&lines, TaxRate::from_bps(1800)).unwrap();
/// assert_eq!(totals.subtotal.cents(), 99_000_00);
/// assert_eq!(totals.tax.cents(), 17_820_00);
/// assert_eq!(totals.total.cents(), 116_820_00);
/// ```
pub fn compute_totals(lines: &[LineDraft], rate: TaxRate) -> Result<SaleTotals, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if lines.is_empty() {
        errors.push(ValidationError::required("items"));
    }

    if lines.len() > MAX_SALE_LINES {
        errors.push(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    let mut line_totals = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let before = errors.len();
        errors.check(validate_quantity(&format!("items[{}].quantity", i), line.quantity));
        errors.check(validate_price_cents(&format!("items[{}].unit_price_cents", i), line.unit_price_cents));
        errors.check(validate_price_cents(&format!("items[{}].discount_cents", i), line.discount_cents));

        // Only price lines whose inputs are in range.
        if errors.len() > before {
            continue;
        }

        match line.line_total(i) {
            Ok(total) => line_totals.push(total),
            Err(e) => errors.push(e),
        }
    }

    errors.into_result()?;

    let too_large = || ValidationErrors::from(ValidationError::invalid("items", "sale amount is too large"));

    let subtotal = line_totals
        .iter()
        .try_fold(Money::zero(), |acc, line| acc.checked_add(*line))
        .ok_or_else(too_large)?;
    let discount = lines
        .iter()
        .try_fold(Money::zero(), |acc, l| acc.checked_add(Money::from_cents(l.discount_cents)))
        .ok_or_else(too_large)?;
    let tax = subtotal.calculate_tax(rate);
    let total = subtotal.checked_add(tax).ok_or_else(too_large)?;

    Ok(SaleTotals {
        line_totals,
        subtotal,
        discount,
        tax,
        total,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sale(status: SaleStatus, total: i64, refunded: i64) -> Sale {
        let now = Utc::now();
        Sale {
            id: "sale-1".into(),
            receipt_number: "S-BLR01-20260101-ABC123".into(),
            customer_id: "c1".into(),
            store_id: "s1".into(),
            user_id: None,
            status,
            payment_method: PaymentMethod::Upi,
            subtotal_cents: total,
            discount_cents: 0,
            tax_rate_bps: 0,
            tax_cents: 0,
            total_cents: total,
            refunded_cents: refunded,
            stock_restored: false,
            notes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            completed_at: None,
            items: vec![],
            refunds: vec![],
        }
    }

    fn line(qty: i64, unit: i64, discount: i64) -> LineDraft {
        LineDraft {
            product_id: "p1".into(),
            sku: "SKU-1".into(),
            name: "Item".into(),
            quantity: qty,
            unit_price_cents: unit,
            discount_cents: discount,
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("partially_refunded".parse::<SaleStatus>().unwrap(), SaleStatus::PartiallyRefunded);
        assert_eq!(" Completed ".parse::<SaleStatus>().unwrap(), SaleStatus::Completed);
        assert!(matches!(
            "shipped".parse::<SaleStatus>(),
            Err(CoreError::InvalidStatus { .. })
        ));
    }

    #[test]
    fn test_status_change_table() {
        assert_eq!(
            plan_status_change(SaleStatus::Pending, SaleStatus::Completed).unwrap(),
            StatusChange::Update(SaleStatus::Completed)
        );
        assert_eq!(
            plan_status_change(SaleStatus::Completed, SaleStatus::Cancelled).unwrap(),
            StatusChange::Cancel
        );
        assert_eq!(
            plan_status_change(SaleStatus::Cancelled, SaleStatus::Cancelled).unwrap(),
            StatusChange::Unchanged
        );
        assert!(plan_status_change(SaleStatus::Cancelled, SaleStatus::Completed).is_err());
        assert!(plan_status_change(SaleStatus::Completed, SaleStatus::Refunded).is_err());
        assert!(plan_status_change(SaleStatus::Completed, SaleStatus::Pending).is_err());
    }

    #[test]
    fn test_can_be_refunded() {
        assert!(sale(SaleStatus::Completed, 1000, 0).can_be_refunded());
        assert!(sale(SaleStatus::PartiallyRefunded, 1000, 400).can_be_refunded());
        assert!(!sale(SaleStatus::Pending, 1000, 0).can_be_refunded());
        assert!(!sale(SaleStatus::Cancelled, 1000, 0).can_be_refunded());
        assert!(!sale(SaleStatus::Refunded, 1000, 1000).can_be_refunded());
    }

    #[test]
    fn test_plan_refund_partial_then_full() {
        let s = sale(SaleStatus::Completed, 1000, 0);
        let plan = s.plan_refund(Money::from_cents(400)).unwrap();
        assert_eq!(plan.status_after, SaleStatus::PartiallyRefunded);
        assert_eq!(plan.refunded_after.cents(), 400);

        let s = sale(SaleStatus::PartiallyRefunded, 1000, 400);
        let plan = s.plan_refund(Money::from_cents(600)).unwrap();
        assert!(plan.is_full());
    }

    #[test]
    fn test_plan_refund_rejections() {
        let s = sale(SaleStatus::Completed, 1000, 0);
        assert!(matches!(
            s.plan_refund(Money::from_cents(1001)),
            Err(CoreError::RefundExceedsBalance { requested: 1001, remaining: 1000 })
        ));
        assert!(matches!(s.plan_refund(Money::zero()), Err(CoreError::Validation(_))));

        let done = sale(SaleStatus::Refunded, 1000, 1000);
        assert!(matches!(
            done.plan_refund(Money::from_cents(1)),
            Err(CoreError::RefundNotAllowed { .. })
        ));
    }

    #[test]
    fn test_compute_totals_multiple_lines() {
        let totals = compute_totals(
            &[line(1, 10_000, 0), line(3, 2_500, 500)],
            TaxRate::from_bps(1800),
        )
        .unwrap();

        assert_eq!(totals.line_totals, vec![Money::from_cents(10_000), Money::from_cents(7_000)]);
        assert_eq!(totals.subtotal.cents(), 17_000);
        assert_eq!(totals.discount.cents(), 500);
        assert_eq!(totals.tax.cents(), 3_060);
        assert_eq!(totals.total.cents(), 20_060);
    }

    #[test]
    fn test_compute_totals_rejects_bad_lines() {
        let errors = compute_totals(&[line(0, 100, 0), line(1, 100, 101)], TaxRate::default())
            .unwrap_err();
        let fields: Vec<String> = errors.field_errors().into_iter().map(|f| f.field).collect();
        assert!(fields.contains(&"items[0].quantity".to_string()));
        assert!(fields.contains(&"items[1].discount_cents".to_string()));

        assert!(compute_totals(&[], TaxRate::default()).is_err());
    }

    #[test]
    fn test_huge_quantity_is_a_validation_error() {
        let errors = compute_totals(&[line(i64::MAX, 1_000_000_000, 0)], TaxRate::default())
            .unwrap_err();
        let fields: Vec<String> = errors.field_errors().into_iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["items[0].quantity".to_string()]);

        let err = line(i64::MAX, 1_000_000_000, 0).line_total(0).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { ref field, .. } if field == "items[0]"));
    }
}
