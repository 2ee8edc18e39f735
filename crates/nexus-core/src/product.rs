//! # Products and Inventory Levels
//!
//! A catalog entry ([`Product`]) is shared by all stores. Stock is tracked
//! per store in an [`InventoryLevel`]:
//!
//! ```text
//! ┌──────────────────────┐        ┌────────────────────────────────────┐
//! │ Product LAP-XPS13-1A │ 1 ── * │ InventoryLevel (product, store)    │
//! │ price, threshold     │        │ stock=8  reserved=3  available=5   │
//! └──────────────────────┘        └────────────────────────────────────┘
//! ```
//!
//! Invariant: `available = stock - reserved >= 0` and `reserved >= 0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    /// Upper-cased, unique. Generated from brand/model when omitted.
    pub sku: String,
    /// EAN/UPC printed on the box. Unique when present.
    pub barcode: Option<String>,
    pub name: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price_cents: i64,
    pub cost_cents: Option<i64>,
    /// Default threshold copied onto new inventory levels.
    pub low_stock_threshold: i64,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// Builds a SKU from brand and model plus a short random suffix.
///
/// ```rust
/// use nexus_core::product::generate_sku;
///
/// let sku = generate_sku(Some("Dell"), Some("XPS 13 9340"), "7f3a");
/// assert_eq!(sku, "DELL-XPS139340-7F3A");
///
/// assert_eq!(generate_sku(None, None, "0001"), "ITEM-0001");
/// ```
pub fn generate_sku(brand: Option<&str>, model: Option<&str>, suffix: &str) -> String {
    fn segment(value: Option<&str>, max: usize) -> Option<String> {
        let cleaned: String = value?
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(max)
            .collect::<String>()
            .to_uppercase();
        (!cleaned.is_empty()).then_some(cleaned)
    }

    let mut parts: Vec<String> = [segment(brand, 8), segment(model, 12)]
        .into_iter()
        .flatten()
        .collect();

    if parts.is_empty() {
        parts.push("ITEM".to_string());
    }

    parts.push(suffix.to_uppercase());
    parts.join("-")
}

/// Canonical SKU form used for storage and lookup.
pub fn normalize_sku(sku: &str) -> String {
    sku.trim().to_uppercase()
}

// =============================================================================
// Inventory Level
// =============================================================================

/// Stock of one product at one store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryLevel {
    pub product_id: String,
    pub store_id: String,
    /// Units physically on hand.
    pub stock: i64,
    /// Units held by in-flight sales.
    pub reserved: i64,
    pub low_stock_threshold: i64,
    pub is_low_stock: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryLevel {
    /// Units that can still be reserved.
    #[inline]
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }
}

/// Low-stock rule: on-hand stock at or below the threshold.
#[inline]
pub fn is_low_stock(stock: i64, threshold: i64) -> bool {
    stock <= threshold
}

/// A product with its per-store levels, as returned by product reads.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductWithStock {
    #[serde(flatten)]
    pub product: Product,
    pub inventory: Vec<InventoryLevel>,
}

impl ProductWithStock {
    /// Level for one store, if the product is stocked there.
    pub fn level_at(&self, store_id: &str) -> Option<&InventoryLevel> {
        self.inventory.iter().find(|l| l.store_id == store_id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sku_truncates_segments() {
        let sku = generate_sku(Some("Hewlett-Packard"), Some("EliteBook 840 G10"), "ab12");
        assert_eq!(sku, "HEWLETTP-ELITEBOOK840-AB12");
    }

    #[test]
    fn test_generate_sku_model_only() {
        assert_eq!(generate_sku(None, Some("MacBook Air"), "x1"), "MACBOOKAIR-X1");
    }

    #[test]
    fn test_available_and_low_stock() {
        let level = InventoryLevel {
            product_id: "p".into(),
            store_id: "s".into(),
            stock: 6,
            reserved: 4,
            low_stock_threshold: 5,
            is_low_stock: false,
            updated_at: Utc::now(),
        };
        assert_eq!(level.available(), 2);
        assert!(!is_low_stock(level.stock, level.low_stock_threshold));
        assert!(is_low_stock(5, 5));
    }

    #[test]
    fn test_normalize_sku() {
        assert_eq!(normalize_sku("  lap-001 "), "LAP-001");
    }
}
