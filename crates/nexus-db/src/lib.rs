//! # nexus-db: Persistence Layer for Nexus CRM
//!
//! SQLite access through sqlx: the entity store, the inventory reservation
//! ledger and the notification outbox.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Nexus CRM Data Flow                              │
//! │                                                                         │
//! │  REST handler / service                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     nexus-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │  Repositories      │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │◄───│  stores, users,    │  │ (embedded) │  │   │
//! │  │   │               │    │  customers,        │  │            │  │   │
//! │  │   │ SqlitePool    │    │  products, sales,  │  │ 001_...sql │  │   │
//! │  │   │ transactions  │    │  repairs, outbox   │  │            │  │   │
//! │  │   │               │    │  InventoryLedger   │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nexus_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("nexus.db")).await?;
//! let reservation = db.inventory().reserve(&product_id, &store_id, 2).await?;
//! db.inventory().release(&reservation).await?;
//! ```
//!
//! ## Transactions
//! Multi-step writes (sale persistence, repair transitions) run in one
//! transaction from [`Database::begin`]. Repository methods ending in `_in`
//! take `&mut SqliteConnection` so they can join it.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::customer::CustomerRepository;
pub use repository::inventory::{InventoryLedger, LowStockItem, Reservation};
pub use repository::outbox::OutboxRepository;
pub use repository::product::{ProductRepository, ProductSearch};
pub use repository::repair::{RepairFilter, RepairRepository};
pub use repository::sale::{SaleFilter, SaleRepository};
pub use repository::store::StoreRepository;
pub use repository::user::{NewUser, UserCredentials, UserRepository};

/// Generates a new entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Six upper-case hex characters for receipt and ticket numbers.
pub fn short_code() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use nexus_core::{Customer, CustomerProfile, Product, Store, DEFAULT_LOW_STOCK_THRESHOLD};

    use crate::{new_id, Database, DbConfig};

    pub async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub async fn store(db: &Database, code: &str) -> Store {
        db.stores()
            .create(code, &format!("Store {}", code), None, None)
            .await
            .unwrap()
    }

    pub async fn product(db: &Database, sku: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: new_id(),
            sku: sku.to_string(),
            barcode: None,
            name: format!("Laptop {}", sku),
            brand: Some("Lenovo".into()),
            model: None,
            category: Some("laptop".into()),
            description: None,
            price_cents,
            cost_cents: None,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap()
    }

    pub async fn customer(db: &Database, email: &str) -> Customer {
        let profile = CustomerProfile {
            name: Some("Ravi Kumar".into()),
            email: Some(email.to_string()),
            ..Default::default()
        }
        .normalized();
        db.customers().find_or_create(&profile).await.unwrap().0
    }

    /// Store + product with `stock` units on hand.
    pub async fn stocked(db: &Database, stock: i64) -> (Store, Product) {
        let store = store(db, "BLR01").await;
        let product = product(db, "LAP-001", 50_000_00).await;
        db.inventory()
            .set_stock(&product.id, &store.id, stock, None)
            .await
            .unwrap();
        (store, product)
    }
}
