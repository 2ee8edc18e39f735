//! # nexus-core: Pure Domain Logic for Nexus CRM
//!
//! Everything the CRM decides without touching I/O: money math, input
//! validation, contact normalisation, sale pricing and refund rules, the
//! repair state machine and notification templates.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Nexus CRM Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    SPA (browser)                                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ JSON over HTTP                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  │    routes ──► services (sales, repairs) ──► dispatcher handle   │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼───────────────┐   │
//! │  │  nexus-db (SQLite/sqlx)     │   │  nexus-notify                 │   │
//! │  │  entity store, ledger,      │   │  WhatsApp / email channels    │   │
//! │  │  outbox                     │   │  dispatcher task              │   │
//! │  └──────────────┬──────────────┘   └───────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────────────────────────▼───────────────┐   │
//! │  │               ★ nexus-core (THIS CRATE) ★                       │   │
//! │  │   money • validation • customer • product • sale • repair      │   │
//! │  │   notification templates                                       │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use nexus_core::{Money, TaxRate};
//!
//! let price = Money::from_cents(54_999_00);
//! let tax = price.calculate_tax(TaxRate::default());
//! assert_eq!(tax.cents(), 9_899_82);
//! assert_eq!(price + tax, Money::from_cents(64_898_82));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod contact;
pub mod customer;
pub mod error;
pub mod money;
pub mod notification;
pub mod product;
pub mod repair;
pub mod sale;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use customer::{Customer, CustomerProfile, CustomerRef};
pub use error::{CoreError, CoreResult, FieldError, ValidationError, ValidationErrors};
pub use money::Money;
pub use notification::{
    Channel, DeliveryResult, NotificationEntry, NotificationStatus, OutboxDraft, RenderedMessage,
    SubjectKind,
};
pub use product::{InventoryLevel, Product, ProductWithStock};
pub use repair::{
    ChannelState, ContactOverride, DeviceInfo, NotificationConsent, Repair, RepairCost, RepairNote,
    RepairPriority, RepairStatus,
};
pub use sale::{PaymentMethod, Refund, Sale, SaleItem, SaleStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default flat tax rate: 18% GST.
pub const DEFAULT_TAX_RATE_BPS: u32 = 1800;

/// Minor units per loyalty point (one point per ₹100).
pub const LOYALTY_POINT_UNIT_CENTS: i64 = 10_000;

/// Maximum quantity of a single sale line.
///
/// Catches typos like 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum number of lines in one sale.
pub const MAX_SALE_LINES: usize = 100;

/// Low-stock threshold for products created without one.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;
