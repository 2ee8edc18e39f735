//! # Services
//!
//! Workflows that span several repositories. Handlers stay thin: they
//! extract, authorize and call one service method.
//!
//! ```text
//! routes::*  ──►  services::*  ──►  nexus_db repositories
//!                      │
//!                      └──► DispatcherHandle::enqueue (after commit)
//! ```

pub mod customers;
pub mod products;
pub mod repairs;
pub mod sales;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::warn;

use nexus_core::{NotificationStatus, OutboxDraft};
use nexus_db::{DbError, DbResult, OutboxRepository};

use crate::error::ApiError;

pub use customers::{CustomerHistory, CustomerService};
pub use products::{NewProduct, ProductChanges, ProductService};
pub use repairs::{RepairService, TrackedRepair};
pub use sales::{CreateSaleRequest, RefundRequest, SaleCoordinator, SaleLineRequest};

/// Writes outbox rows on the caller's transaction and returns the ids that
/// need a delivery attempt. Skipped rows are recorded but never queued.
pub(crate) async fn write_outbox(conn: &mut SqliteConnection, drafts: &[OutboxDraft]) -> DbResult<Vec<String>> {
    let mut pending = Vec::new();
    for draft in drafts {
        let entry = OutboxRepository::enqueue_in(conn, draft).await?;
        if entry.status == NotificationStatus::Pending {
            pending.push(entry.id);
        }
    }
    Ok(pending)
}

/// Commits on success, rolls back on failure. Callers touch the pool again
/// only after this returns.
pub(crate) async fn finish<T>(tx: Transaction<'static, Sqlite>, result: DbResult<T>) -> Result<T, ApiError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(DbError::from)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e.into())
        }
    }
}
