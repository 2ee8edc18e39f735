//! # Sale Repository
//!
//! Sales, their line items and refund history.
//!
//! Every write that changes money or status is conditional on the value the
//! caller last read, so two concurrent refunds (or a refund racing a cancel)
//! cannot both apply:
//!
//! ```text
//! UPDATE sales SET refunded_cents = :after, status = :status
//!  WHERE id = :id AND refunded_cents = :before AND status = :current
//!        └──────────── 0 rows → DbError::TransactionFailed
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use nexus_core::sale::RefundPlan;
use nexus_core::{Refund, Sale, SaleItem, SaleStatus};

const SALE_COLUMNS: &str = r#"
    id, receipt_number, customer_id, store_id, user_id, status, payment_method,
    subtotal_cents, discount_cents, tax_rate_bps, tax_cents, total_cents,
    refunded_cents, stock_restored, notes, is_active, created_at, updated_at, completed_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, sale_id, product_id, sku_snapshot, name_snapshot, quantity,
    unit_price_cents, discount_cents, line_total_cents, line_no
"#;

/// Filters for [`SaleRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub store_id: Option<String>,
    pub status: Option<SaleStatus>,
    pub customer_id: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Writes (inside the caller's transaction)
    // =========================================================================

    /// Inserts a sale and its items.
    pub async fn insert_in(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(
            id = %sale.id,
            receipt = %sale.receipt_number,
            lines = sale.items.len(),
            total = sale.total_cents,
            "Inserting sale"
        );

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, customer_id, store_id, user_id, status, payment_method,
                subtotal_cents, discount_cents, tax_rate_bps, tax_cents, total_cents,
                refunded_cents, stock_restored, notes, is_active, created_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(&sale.customer_id)
        .bind(&sale.store_id)
        .bind(&sale.user_id)
        .bind(sale.status)
        .bind(sale.payment_method)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_rate_bps)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.refunded_cents)
        .bind(sale.stock_restored)
        .bind(&sale.notes)
        .bind(sale.is_active)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.completed_at)
        .execute(&mut *conn)
        .await?;

        for item in &sale.items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, product_id, sku_snapshot, name_snapshot, quantity,
                    unit_price_cents, discount_cents, line_total_cents, line_no
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&item.id)
            .bind(&sale.id)
            .bind(&item.product_id)
            .bind(&item.sku_snapshot)
            .bind(&item.name_snapshot)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.discount_cents)
            .bind(item.line_total_cents)
            .bind(item.line_no)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Moves a sale from `from` to `to`. Fails if another writer changed the
    /// status first. `completed_at` is stamped the first time a sale
    /// reaches `completed`.
    pub async fn update_status_in(
        conn: &mut SqliteConnection,
        id: &str,
        from: SaleStatus,
        to: SaleStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = ?3,
                completed_at = CASE
                    WHEN ?3 = 'completed' AND completed_at IS NULL THEN ?4
                    ELSE completed_at
                END,
                updated_at = ?4
            WHERE id = ?1 AND status = ?2 AND is_active = 1
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "sale {} is no longer {}",
                id, from
            )));
        }

        Ok(())
    }

    /// Flips `stock_restored` from false to true. Returns `false` when the
    /// stock was already returned, so callers restock at most once.
    pub async fn mark_stock_restored_in(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sales SET stock_restored = 1, updated_at = ?2 WHERE id = ?1 AND stock_restored = 0",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a refund planned against `sale` (as read by the caller).
    pub async fn apply_refund_in(
        conn: &mut SqliteConnection,
        sale: &Sale,
        refund: &Refund,
        plan: &RefundPlan,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                refunded_cents = ?2,
                status = ?3,
                updated_at = ?4
            WHERE id = ?1 AND refunded_cents = ?5 AND status = ?6
            "#,
        )
        .bind(&sale.id)
        .bind(plan.refunded_after.cents())
        .bind(plan.status_after)
        .bind(refund.created_at)
        .bind(sale.refunded_cents)
        .bind(sale.status)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "sale {} changed while refunding",
                sale.receipt_number
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO sale_refunds (id, sale_id, amount_cents, reason, refunded_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&refund.id)
        .bind(&sale.id)
        .bind(refund.amount_cents)
        .bind(&refund.reason)
        .bind(&refund.refunded_by)
        .bind(refund.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Loads a sale with items and refunds on the given connection.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {} FROM sales WHERE id = ?1 AND is_active = 1",
            SALE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(mut sale) = sale else {
            return Ok(None);
        };

        sale.items = sqlx::query_as::<_, SaleItem>(&format!(
            "SELECT {} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        sale.refunds = sqlx::query_as::<_, Refund>(
            r#"
            SELECT id, sale_id, amount_cents, reason, refunded_by, created_at
            FROM sale_refunds WHERE sale_id = ?1 ORDER BY created_at
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(sale))
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Newest first. Items and refunds are not loaded.
    pub async fn list(&self, filter: &SaleFilter) -> DbResult<Vec<Sale>> {
        let limit = if filter.limit == 0 { 100 } else { filter.limit };

        let sales = sqlx::query_as::<_, Sale>(&format!(
            r#"
            SELECT {} FROM sales
            WHERE is_active = 1
              AND (?1 IS NULL OR store_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR customer_id = ?3)
            ORDER BY created_at DESC
            LIMIT ?4
            "#,
            SALE_COLUMNS
        ))
        .bind(&filter.store_id)
        .bind(filter.status)
        .bind(&filter.customer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Sale>> {
        self.list(&SaleFilter {
            customer_id: Some(customer_id.to_string()),
            limit: 500,
            ..Default::default()
        })
        .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{customer, setup, stocked};
    use crate::{new_id, Database};
    use nexus_core::{Money, PaymentMethod};

    async fn seeded_sale(db: &Database, status: SaleStatus) -> Sale {
        let (s, p) = stocked(db, 10).await;
        let c = customer(db, "buyer@example.com").await;
        let now = Utc::now();
        let id = new_id();

        let sale = Sale {
            id: id.clone(),
            receipt_number: format!("S-BLR01-20260101-{}", &id[..6].to_uppercase()),
            customer_id: c.id,
            store_id: s.id,
            user_id: None,
            status,
            payment_method: PaymentMethod::Upi,
            subtotal_cents: 100_000_00,
            discount_cents: 0,
            tax_rate_bps: 1800,
            tax_cents: 18_000_00,
            total_cents: 118_000_00,
            refunded_cents: 0,
            stock_restored: false,
            notes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            completed_at: (status == SaleStatus::Completed).then_some(now),
            items: vec![SaleItem {
                id: new_id(),
                sale_id: id.clone(),
                product_id: p.id.clone(),
                sku_snapshot: p.sku.clone(),
                name_snapshot: p.name.clone(),
                quantity: 2,
                unit_price_cents: 50_000_00,
                discount_cents: 0,
                line_total_cents: 100_000_00,
                line_no: 0,
            }],
            refunds: Vec::new(),
        };

        let mut tx = db.begin().await.unwrap();
        SaleRepository::insert_in(&mut tx, &sale).await.unwrap();
        tx.commit().await.unwrap();
        sale
    }

    fn refund_of(sale: &Sale, cents: i64) -> Refund {
        Refund {
            id: new_id(),
            sale_id: sale.id.clone(),
            amount_cents: cents,
            reason: "damaged box".into(),
            refunded_by: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_with_items() {
        let db = setup().await;
        let sale = seeded_sale(&db, SaleStatus::Completed).await;

        let loaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.receipt_number, sale.receipt_number);
        assert_eq!(loaded.status, SaleStatus::Completed);
        assert_eq!(loaded.payment_method, PaymentMethod::Upi);
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].quantity, 2);
        assert!(loaded.refunds.is_empty());

        let listed = db
            .sales()
            .list(&SaleFilter {
                status: Some(SaleStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(db
            .sales()
            .list(&SaleFilter {
                status: Some(SaleStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_refund_is_conditional_on_balance_read() {
        let db = setup().await;
        let sale = seeded_sale(&db, SaleStatus::Completed).await;

        let plan = sale.plan_refund(Money::from_cents(18_000_00)).unwrap();
        let mut tx = db.begin().await.unwrap();
        SaleRepository::apply_refund_in(&mut tx, &sale, &refund_of(&sale, 18_000_00), &plan)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // Same stale snapshot again: must not apply twice.
        let mut tx = db.begin().await.unwrap();
        let err = SaleRepository::apply_refund_in(&mut tx, &sale, &refund_of(&sale, 18_000_00), &plan)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::TransactionFailed(_)));
        tx.rollback().await.unwrap();

        let loaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.refunded_cents, 18_000_00);
        assert_eq!(loaded.status, SaleStatus::PartiallyRefunded);
        assert_eq!(loaded.refunds.len(), 1);
    }

    #[tokio::test]
    async fn test_stock_restored_flips_once() {
        let db = setup().await;
        let sale = seeded_sale(&db, SaleStatus::Completed).await;

        let mut tx = db.begin().await.unwrap();
        assert!(SaleRepository::mark_stock_restored_in(&mut tx, &sale.id).await.unwrap());
        assert!(!SaleRepository::mark_stock_restored_in(&mut tx, &sale.id).await.unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_stamps_completion() {
        let db = setup().await;
        let sale = seeded_sale(&db, SaleStatus::Pending).await;
        assert!(sale.completed_at.is_none());

        let mut tx = db.begin().await.unwrap();
        SaleRepository::update_status_in(&mut tx, &sale.id, SaleStatus::Pending, SaleStatus::Completed, Utc::now())
            .await
            .unwrap();
        let stale = SaleRepository::update_status_in(
            &mut tx,
            &sale.id,
            SaleStatus::Pending,
            SaleStatus::Cancelled,
            Utc::now(),
        )
        .await;
        assert!(matches!(stale, Err(DbError::TransactionFailed(_))));
        tx.commit().await.unwrap();

        let loaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SaleStatus::Completed);
        assert!(loaded.completed_at.is_some());
        assert_eq!(db.sales().list_for_customer(&sale.customer_id).await.unwrap().len(), 1);
    }
}
