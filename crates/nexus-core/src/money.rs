//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (paise)                              │
//! │    ₹74,999.00 is stored as 7_499_900                                    │
//! │    18% GST on it is (7_499_900 × 1800 + 5000) / 10000 = 1_349_982       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `*_cents` column in the database and every `*_cents` field in the
//! API is a count of minor units. Only the SPA formats them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed so refunds and adjustments can be expressed directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use nexus_core::money::Money;
    ///
    /// let price = Money::from_cents(7_499_900); // ₹74,999.00
    /// assert_eq!(price.cents(), 7_499_900);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_PER_MAJOR)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / MINOR_PER_MAJOR
    }

    /// Returns the minor-unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % MINOR_PER_MAJOR).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Calculates tax, rounding half up on minor units.
    ///
    /// ## Implementation
    /// `(amount * bps + 5000) / 10000` in i128 so large invoices cannot
    /// overflow.
    ///
    /// ## Example
    /// ```rust
    /// use nexus_core::money::Money;
    /// use nexus_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_cents(10_000); // ₹100.00
    /// let tax = subtotal.calculate_tax(TaxRate::from_bps(1800));
    /// assert_eq!(tax.cents(), 1_800);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Multiplies by a quantity; `None` on overflow.
    #[inline]
    pub const fn checked_mul_quantity(&self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Subtraction that never goes below zero.
    #[inline]
    pub fn saturating_sub_to_zero(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }
}

// =============================================================================
// Operator Implementations
// =============================================================================

impl Add for Money {
    type Output = Money;

    #[inline]
    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    #[inline]
    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Money) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    #[inline]
    fn mul(self, qty: i64) -> Money {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

/// Formats as `₹1234.50`; negative values as `-₹12.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(
            f,
            "{}₹{}.{:02}",
            sign,
            abs / MINOR_PER_MAJOR,
            abs % MINOR_PER_MAJOR
        )
    }
}

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Money(cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_major_minor() {
        let m = Money::from_cents(7_499_950);
        assert_eq!(m.major(), 74_999);
        assert_eq!(m.minor_part(), 50);
        assert_eq!(Money::from_major(100).cents(), 10_000);
    }

    #[test]
    fn test_default_gst() {
        let subtotal = Money::from_cents(7_499_900);
        let tax = subtotal.calculate_tax(TaxRate::from_bps(1800));
        assert_eq!(tax.cents(), 1_349_982);
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // 25 × 18% = 4.5 → 5
        let tax = Money::from_cents(25).calculate_tax(TaxRate::from_bps(1800));
        assert_eq!(tax.cents(), 5);
    }

    #[test]
    fn test_zero_rate() {
        let tax = Money::from_cents(12_345).calculate_tax(TaxRate::zero());
        assert!(tax.is_zero());
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);
        assert_eq!((b * 3).cents(), 750);
        assert_eq!(b.saturating_sub_to_zero(a), Money::zero());

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 1500);
    }

    #[test]
    fn test_checked_arithmetic() {
        let price = Money::from_cents(1_000_000_000);
        assert_eq!(price.checked_mul_quantity(3), Some(Money::from_cents(3_000_000_000)));
        assert_eq!(price.checked_mul_quantity(i64::MAX), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(price.checked_add(price), Some(Money::from_cents(2_000_000_000)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(123_450).to_string(), "₹1234.50");
        assert_eq!(Money::from_cents(-1200).to_string(), "-₹12.00");
        assert_eq!(Money::from_cents(5).to_string(), "₹0.05");
    }
}
