//! # Inventory Reservation Ledger
//!
//! The single source of truth for "can this sale proceed". Stock is tracked
//! per (product, store); a sale first *reserves* units, then *commits* them
//! once the sale row is durable, or *releases* them on failure.
//!
//! ## Reservation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  reserve(q)                                                            │
//! │    UPDATE inventory SET reserved = reserved + q                        │
//! │     WHERE ... AND stock - reserved >= q        ◄── compare-and-swap    │
//! │    INSERT INTO stock_holds (...)                                       │
//! │       │                                                                 │
//! │       ├──────────────► commit:  stock -= q, reserved -= q, drop hold   │
//! │       │                                                                 │
//! │       ├──────────────► release: reserved -= q, drop hold               │
//! │       │                                                                 │
//! │       └── older than TTL ──► release_expired (sweeper)                 │
//! │                                                                         │
//! │  Invariant: 0 <= reserved <= stock  (CHECK constraints + guards)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Deleting the hold row is what makes commit and release idempotent: only
//! the caller whose DELETE affected a row touches the counters.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::new_id;
use nexus_core::validation::validate_stock_count;
use nexus_core::{CoreError, InventoryLevel, ValidationError};

const LEVEL_COLUMNS: &str =
    "product_id, store_id, stock, reserved, low_stock_threshold, is_low_stock, updated_at";

// =============================================================================
// Types
// =============================================================================

/// Handle to an outstanding stock hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Reservation {
    pub id: String,
    pub product_id: String,
    pub store_id: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
}

/// A level at or below its threshold, with catalog labels.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LowStockItem {
    pub sku: String,
    pub name: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub level: InventoryLevel,
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryLedger { pool }
    }

    /// Reserves `quantity` units of a product at a store.
    ///
    /// ## Errors
    /// - `DbError::Core(CoreError::InsufficientStock)` when fewer units are
    ///   available (including when the product was never stocked there)
    /// - `DbError::NotFound` when the product does not exist
    pub async fn reserve(&self, product_id: &str, store_id: &str, quantity: i64) -> DbResult<Reservation> {
        if quantity <= 0 {
            return Err(CoreError::from(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            })
            .into());
        }

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE inventory SET
                reserved = reserved + ?3,
                updated_at = ?4
            WHERE product_id = ?1 AND store_id = ?2 AND stock - reserved >= ?3
            "#,
        )
        .bind(product_id)
        .bind(store_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let shortfall = Self::shortfall(&mut tx, product_id, store_id, quantity).await;
            tx.rollback().await?;
            return Err(shortfall?);
        }

        let reservation = Reservation {
            id: new_id(),
            product_id: product_id.to_string(),
            store_id: store_id.to_string(),
            quantity,
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO stock_holds (id, product_id, store_id, quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&reservation.id)
        .bind(&reservation.product_id)
        .bind(&reservation.store_id)
        .bind(reservation.quantity)
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            hold = %reservation.id,
            product_id = %product_id,
            store_id = %store_id,
            quantity,
            "Stock reserved"
        );

        Ok(reservation)
    }

    /// Builds the error for a failed reservation.
    async fn shortfall(
        conn: &mut SqliteConnection,
        product_id: &str,
        store_id: &str,
        requested: i64,
    ) -> DbResult<DbError> {
        let row: Option<(String, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT p.sku, i.stock - i.reserved
            FROM products p
            LEFT JOIN inventory i ON i.product_id = p.id AND i.store_id = ?2
            WHERE p.id = ?1
            "#,
        )
        .bind(product_id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(match row {
            Some((sku, available)) => CoreError::InsufficientStock {
                sku,
                available: available.unwrap_or(0),
                requested,
            }
            .into(),
            None => DbError::not_found("Product", product_id),
        })
    }

    /// Turns a reservation into a permanent decrement. Runs inside the
    /// caller's transaction so it commits together with the sale.
    ///
    /// Fails with `NotFound` if the hold was already released (e.g. by the
    /// sweeper); the caller's transaction must then roll back.
    pub async fn commit_in(conn: &mut SqliteConnection, reservation: &Reservation) -> DbResult<()> {
        let deleted = sqlx::query("DELETE FROM stock_holds WHERE id = ?1")
            .bind(&reservation.id)
            .execute(&mut *conn)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(DbError::not_found("Stock hold", &reservation.id));
        }

        let result = sqlx::query(
            r#"
            UPDATE inventory SET
                stock = stock - ?3,
                reserved = reserved - ?3,
                is_low_stock = (stock - ?3) <= low_stock_threshold,
                updated_at = ?4
            WHERE product_id = ?1 AND store_id = ?2 AND reserved >= ?3
            "#,
        )
        .bind(&reservation.product_id)
        .bind(&reservation.store_id)
        .bind(reservation.quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "inventory for hold {} no longer carries the reservation",
                reservation.id
            )));
        }

        Ok(())
    }

    /// Commits a reservation in its own transaction.
    pub async fn commit(&self, reservation: &Reservation) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::commit_in(&mut tx, reservation).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Gives reserved units back. Returns `false` when the hold no longer
    /// exists (already committed or released); counters are then untouched.
    pub async fn release(&self, reservation: &Reservation) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;
        let released = Self::release_in(&mut tx, reservation).await?;
        tx.commit().await?;
        Ok(released)
    }

    async fn release_in(conn: &mut SqliteConnection, reservation: &Reservation) -> DbResult<bool> {
        let deleted = sqlx::query("DELETE FROM stock_holds WHERE id = ?1")
            .bind(&reservation.id)
            .execute(&mut *conn)
            .await?;

        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE inventory SET
                reserved = reserved - ?3,
                updated_at = ?4
            WHERE product_id = ?1 AND store_id = ?2 AND reserved >= ?3
            "#,
        )
        .bind(&reservation.product_id)
        .bind(&reservation.store_id)
        .bind(reservation.quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(hold = %reservation.id, quantity = reservation.quantity, "Reservation released");
        Ok(true)
    }

    /// Releases every reservation, logging (not returning) individual
    /// failures. Used when a sale aborts.
    pub async fn release_all(&self, reservations: &[Reservation]) {
        for reservation in reservations {
            if let Err(e) = self.release(reservation).await {
                warn!(hold = %reservation.id, error = %e, "Failed to release reservation");
            }
        }
    }

    /// Adds units to stock, creating the level (with the product's default
    /// threshold) if the product was never stocked at the store.
    pub async fn restock_in(
        conn: &mut SqliteConnection,
        product_id: &str,
        store_id: &str,
        quantity: i64,
    ) -> DbResult<InventoryLevel> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO inventory (
                product_id, store_id, stock, reserved, low_stock_threshold, is_low_stock, updated_at
            )
            SELECT p.id, ?2, ?3, 0, p.low_stock_threshold, ?3 <= p.low_stock_threshold, ?4
            FROM products p WHERE p.id = ?1
            ON CONFLICT (product_id, store_id) DO UPDATE SET
                stock = stock + excluded.stock,
                is_low_stock = (stock + excluded.stock) <= low_stock_threshold,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(store_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        Self::level_in(conn, product_id, store_id)
            .await?
            .ok_or_else(|| DbError::not_found("Inventory", format!("{}/{}", product_id, store_id)))
    }

    /// Adds units to stock in its own transaction.
    pub async fn restock(&self, product_id: &str, store_id: &str, quantity: i64) -> DbResult<InventoryLevel> {
        if quantity <= 0 {
            return Err(CoreError::from(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            })
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let level = Self::restock_in(&mut tx, product_id, store_id, quantity).await?;
        tx.commit().await?;

        info!(product_id = %product_id, store_id = %store_id, quantity, stock = level.stock, "Restocked");
        Ok(level)
    }

    /// Sets the counted stock (and optionally the threshold). Rejects counts
    /// below what is currently reserved.
    pub async fn set_stock(
        &self,
        product_id: &str,
        store_id: &str,
        stock: i64,
        threshold: Option<i64>,
    ) -> DbResult<InventoryLevel> {
        validate_stock_count("stock", stock).map_err(CoreError::from)?;
        if let Some(t) = threshold {
            validate_stock_count("low_stock_threshold", t).map_err(CoreError::from)?;
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE inventory SET
                stock = ?3,
                low_stock_threshold = COALESCE(?4, low_stock_threshold),
                is_low_stock = ?3 <= COALESCE(?4, low_stock_threshold),
                updated_at = ?5
            WHERE product_id = ?1 AND store_id = ?2 AND reserved <= ?3
            "#,
        )
        .bind(product_id)
        .bind(store_id)
        .bind(stock)
        .bind(threshold)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            if let Some(level) = Self::level_in(&mut tx, product_id, store_id).await? {
                tx.rollback().await?;
                return Err(CoreError::from(ValidationError::OutOfRange {
                    field: "stock".to_string(),
                    min: level.reserved,
                    max: 1_000_000,
                })
                .into());
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO inventory (
                    product_id, store_id, stock, reserved, low_stock_threshold, is_low_stock, updated_at
                )
                SELECT p.id, ?2, ?3, 0,
                       COALESCE(?4, p.low_stock_threshold),
                       ?3 <= COALESCE(?4, p.low_stock_threshold),
                       ?5
                FROM products p WHERE p.id = ?1
                "#,
            )
            .bind(product_id)
            .bind(store_id)
            .bind(stock)
            .bind(threshold)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(DbError::not_found("Product", product_id));
            }
        }

        let level = Self::level_in(&mut tx, product_id, store_id)
            .await?
            .ok_or_else(|| DbError::not_found("Inventory", format!("{}/{}", product_id, store_id)))?;
        tx.commit().await?;

        info!(product_id = %product_id, store_id = %store_id, stock, "Stock count set");
        Ok(level)
    }

    async fn level_in(
        conn: &mut SqliteConnection,
        product_id: &str,
        store_id: &str,
    ) -> DbResult<Option<InventoryLevel>> {
        let level = sqlx::query_as::<_, InventoryLevel>(&format!(
            "SELECT {} FROM inventory WHERE product_id = ?1 AND store_id = ?2",
            LEVEL_COLUMNS
        ))
        .bind(product_id)
        .bind(store_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(level)
    }

    pub async fn level(&self, product_id: &str, store_id: &str) -> DbResult<Option<InventoryLevel>> {
        let mut conn = self.pool.acquire().await?;
        Self::level_in(&mut conn, product_id, store_id).await
    }

    /// Every store's level for one product.
    pub async fn levels_for_product(&self, product_id: &str) -> DbResult<Vec<InventoryLevel>> {
        let levels = sqlx::query_as::<_, InventoryLevel>(&format!(
            "SELECT {} FROM inventory WHERE product_id = ?1 ORDER BY store_id",
            LEVEL_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    /// Active products whose on-hand stock is at or below the threshold.
    pub async fn low_stock(&self, store_id: Option<&str>) -> DbResult<Vec<LowStockItem>> {
        let items = sqlx::query_as::<_, LowStockItem>(
            r#"
            SELECT p.sku, p.name,
                   i.product_id, i.store_id, i.stock, i.reserved,
                   i.low_stock_threshold, i.is_low_stock, i.updated_at
            FROM inventory i
            JOIN products p ON p.id = i.product_id
            WHERE p.is_active = 1
              AND i.stock <= i.low_stock_threshold
              AND (?1 IS NULL OR i.store_id = ?1)
            ORDER BY i.stock ASC, p.name
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Releases holds created before `cutoff`. Returns what was released.
    pub async fn release_expired(&self, cutoff: DateTime<Utc>) -> DbResult<Vec<Reservation>> {
        let expired = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT id, product_id, store_id, quantity, created_at
            FROM stock_holds
            WHERE created_at < ?1
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut released = Vec::with_capacity(expired.len());
        for reservation in expired {
            // A concurrent commit may have won; release() then reports false.
            if self.release(&reservation).await? {
                released.push(reservation);
            }
        }

        Ok(released)
    }

    /// Number of outstanding holds.
    pub async fn outstanding_holds(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_holds")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{product, setup, stocked, store};

    fn available(level: &InventoryLevel) -> i64 {
        level.stock - level.reserved
    }

    #[tokio::test]
    async fn test_reserve_exact_then_fail() {
        let db = setup().await;
        let (s, p) = stocked(&db, 5).await;
        let ledger = db.inventory();

        ledger.reserve(&p.id, &s.id, 5).await.unwrap();
        let level = ledger.level(&p.id, &s.id).await.unwrap().unwrap();
        assert_eq!(available(&level), 0);

        let err = ledger.reserve(&p.id, &s.id, 1).await.unwrap_err();
        match err {
            DbError::Core(CoreError::InsufficientStock { sku, available, requested }) => {
                assert_eq!(sku, "LAP-001");
                assert_eq!(available, 0);
                assert_eq!(requested, 1);
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reserve_then_release_restores_available() {
        let db = setup().await;
        let (s, p) = stocked(&db, 4).await;
        let ledger = db.inventory();

        let r = ledger.reserve(&p.id, &s.id, 3).await.unwrap();
        assert!(ledger.release(&r).await.unwrap());
        assert!(!ledger.release(&r).await.unwrap());

        let level = ledger.level(&p.id, &s.id).await.unwrap().unwrap();
        assert_eq!(level.stock, 4);
        assert_eq!(level.reserved, 0);
        assert_eq!(ledger.outstanding_holds().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reserve_then_commit_decrements_stock() {
        let db = setup().await;
        let (s, p) = stocked(&db, 8).await;
        let ledger = db.inventory();

        let other = ledger.reserve(&p.id, &s.id, 1).await.unwrap();
        let r = ledger.reserve(&p.id, &s.id, 3).await.unwrap();
        ledger.commit(&r).await.unwrap();

        let level = ledger.level(&p.id, &s.id).await.unwrap().unwrap();
        assert_eq!(level.stock, 5);
        assert_eq!(level.reserved, 1);
        assert!(level.is_low_stock);

        // Committing twice fails, counters untouched.
        assert!(matches!(ledger.commit(&r).await, Err(DbError::NotFound { .. })));
        ledger.release(&other).await.unwrap();
    }

    #[tokio::test]
    async fn test_reserve_unstocked_store_and_unknown_product() {
        let db = setup().await;
        let (_, p) = stocked(&db, 2).await;
        let elsewhere = store(&db, "DEL01").await;

        let err = db.inventory().reserve(&p.id, &elsewhere.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { available: 0, .. })
        ));

        let err = db.inventory().reserve("missing", &elsewhere.id, 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_oversell() {
        let db = setup().await;
        let (s, p) = stocked(&db, 5).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = db.inventory();
            let (pid, sid) = (p.id.clone(), s.id.clone());
            handles.push(tokio::spawn(async move { ledger.reserve(&pid, &sid, 2).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if let Ok(r) = handle.await.unwrap() {
                granted += r.quantity;
            }
        }

        assert_eq!(granted, 4);
        let level = db.inventory().level(&p.id, &s.id).await.unwrap().unwrap();
        assert_eq!(level.reserved, 4);
        assert!(available(&level) >= 0);
    }

    #[tokio::test]
    async fn test_restock_creates_and_increments() {
        let db = setup().await;
        let s = store(&db, "HYD01").await;
        let p = product(&db, "LAP-777", 100).await;
        let ledger = db.inventory();

        let level = ledger.restock(&p.id, &s.id, 3).await.unwrap();
        assert_eq!(level.stock, 3);
        assert!(level.is_low_stock);

        let level = ledger.restock(&p.id, &s.id, 10).await.unwrap();
        assert_eq!(level.stock, 13);
        assert!(!level.is_low_stock);

        assert!(matches!(ledger.restock("nope", &s.id, 1).await, Err(DbError::NotFound { .. })));
        assert!(ledger.restock(&p.id, &s.id, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_set_stock_rejects_below_reserved() {
        let db = setup().await;
        let (s, p) = stocked(&db, 6).await;
        let ledger = db.inventory();
        ledger.reserve(&p.id, &s.id, 4).await.unwrap();

        let err = ledger.set_stock(&p.id, &s.id, 3, None).await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));

        let level = ledger.set_stock(&p.id, &s.id, 20, Some(2)).await.unwrap();
        assert_eq!(level.stock, 20);
        assert_eq!(level.reserved, 4);
        assert_eq!(level.low_stock_threshold, 2);
        assert!(!level.is_low_stock);
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let db = setup().await;
        let (s, p) = stocked(&db, 5).await;
        let plenty = product(&db, "LAP-900", 100).await;
        db.inventory().set_stock(&plenty.id, &s.id, 50, None).await.unwrap();

        let low = db.inventory().low_stock(Some(&s.id)).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].level.product_id, p.id);
        assert_eq!(low[0].sku, "LAP-001");
        assert!(db.inventory().low_stock(Some("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_expired_only_touches_old_holds() {
        let db = setup().await;
        let (s, p) = stocked(&db, 10).await;
        let ledger = db.inventory();

        let stale = ledger.reserve(&p.id, &s.id, 2).await.unwrap();
        let committed = ledger.reserve(&p.id, &s.id, 1).await.unwrap();
        ledger.commit(&committed).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let fresh_cutoff = stale.created_at - chrono::Duration::seconds(1);

        assert!(ledger.release_expired(fresh_cutoff).await.unwrap().is_empty());

        let released = ledger.release_expired(cutoff).await.unwrap();
        assert_eq!(released, vec![stale]);

        let level = ledger.level(&p.id, &s.id).await.unwrap().unwrap();
        assert_eq!(level.stock, 9);
        assert_eq!(level.reserved, 0);
    }
}
