//! # Repository Module
//!
//! Database repository implementations for Nexus CRM.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Service (apps/api)                                                    │
//! │       │                                                                 │
//! │       │  db.inventory().reserve(product, store, 2)                     │
//! │       ▼                                                                 │
//! │  InventoryLedger                                                       │
//! │  ├── reserve / commit / release                                        │
//! │  ├── restock / set_stock                                               │
//! │  └── release_expired                                                   │
//! │       │                                                                 │
//! │       │  SQL (conditional UPDATE)                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`store::StoreRepository`] - Stores
//! - [`user::UserRepository`] - Staff accounts and credentials
//! - [`customer::CustomerRepository`] - Customers, find-or-create, search
//! - [`product::ProductRepository`] - Catalog
//! - [`inventory::InventoryLedger`] - Per-store stock and reservations
//! - [`sale::SaleRepository`] - Sales, items, refunds
//! - [`repair::RepairRepository`] - Repair tickets and notes
//! - [`outbox::OutboxRepository`] - Notification outbox

pub mod customer;
pub mod inventory;
pub mod outbox;
pub mod product;
pub mod repair;
pub mod sale;
pub mod store;
pub mod user;
