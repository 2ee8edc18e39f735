//! # Sale Transaction Coordinator
//!
//! Turns a checkout request into a persisted sale without ever leaving
//! stock half-decremented.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. resolve customer (CustomerRef)                                      │
//! │  2. snapshot products, price lines, compute totals                      │
//! │  3. reserve each line ────────── fail ──► release earlier holds, 400    │
//! │  4. BEGIN                                                               │
//! │       insert sale + items                                               │
//! │       commit every hold          (stock -= qty, reserved -= qty)        │
//! │       customer totals + loyalty                                         │
//! │       outbox rows (receipt, completed sales only)                       │
//! │     COMMIT ───────────────────── fail ──► ROLLBACK, release all holds   │
//! │  5. hand outbox ids to the dispatcher                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cancellation and full refunds return stock at most once, guarded by the
//! sale's `stock_restored` flag.

use std::str::FromStr;

use chrono::Utc;
use serde::Deserialize;
use sqlx::{Sqlite, Transaction};
use tracing::info;

use nexus_core::customer::loyalty_points_for;
use nexus_core::notification::plan_sale_receipt;
use nexus_core::sale::{compute_totals, plan_status_change, receipt_number, LineDraft, StatusChange};
use nexus_core::validation::{validate_optional_text, validate_text};
use nexus_core::{
    CustomerRef, Money, OutboxDraft, PaymentMethod, Refund, Sale, SaleItem, SaleStatus, TaxRate,
    ValidationError,
};
use nexus_db::{
    new_id, short_code, CustomerRepository, Database, DbResult, InventoryLedger, Reservation,
    SaleFilter, SaleRepository,
};
use nexus_notify::DispatcherHandle;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::services::customers::CustomerService;
use crate::services::{finish, write_outbox};

// =============================================================================
// Requests
// =============================================================================

/// One line of `POST /sales`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Overrides the catalog price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
    #[serde(default)]
    pub discount_cents: i64,
}

/// Body of `POST /sales`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSaleRequest {
    pub customer: CustomerRef,
    pub store_id: String,
    pub items: Vec<SaleLineRequest>,
    pub payment_method: PaymentMethod,
    /// `pending` or `completed`; defaults to `completed`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `POST /sales/:id/refund`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundRequest {
    pub amount_cents: i64,
    pub reason: String,
    /// Return the items to stock. Honoured on a full refund only.
    #[serde(default)]
    pub restock: bool,
}

fn initial_status(requested: Option<&str>) -> Result<SaleStatus, ApiError> {
    let Some(raw) = requested else {
        return Ok(SaleStatus::Completed);
    };

    match SaleStatus::from_str(raw)? {
        status @ (SaleStatus::Pending | SaleStatus::Completed) => Ok(status),
        other => Err(ValidationError::invalid(
            "status",
            format!("a new sale cannot start as {}", other),
        )
        .into()),
    }
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct SaleCoordinator {
    db: Database,
    tax_rate: TaxRate,
    notifier: DispatcherHandle,
}

impl SaleCoordinator {
    pub fn new(db: Database, tax_rate: TaxRate, notifier: DispatcherHandle) -> Self {
        SaleCoordinator {
            db,
            tax_rate,
            notifier,
        }
    }

    /// Records a sale. Either every line's stock is committed together with
    /// the sale row, or nothing changes.
    pub async fn create(&self, request: CreateSaleRequest, user: &AuthUser) -> Result<Sale, ApiError> {
        user.ensure_store(&request.store_id)?;
        let status = initial_status(request.status.as_deref())?;
        validate_optional_text("notes", request.notes.as_deref(), 1000)?;

        let store = self
            .db
            .stores()
            .get_by_id(&request.store_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Store", &request.store_id))?;

        let customer = CustomerService::new(self.db.clone())
            .resolve(&request.customer)
            .await?;

        let mut lines = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = self
                .db
                .products()
                .get_by_id(&line.product_id)
                .await?
                .ok_or_else(|| ApiError::not_found("Product", &line.product_id))?;

            lines.push(LineDraft {
                unit_price_cents: line.unit_price_cents.unwrap_or(product.price_cents),
                product_id: product.id,
                sku: product.sku,
                name: product.name,
                quantity: line.quantity,
                discount_cents: line.discount_cents,
            });
        }

        let totals = compute_totals(&lines, self.tax_rate)?;

        let reservations = self.reserve_lines(&lines, &store.id).await?;

        let now = Utc::now();
        let sale_id = new_id();
        let items: Vec<SaleItem> = lines
            .iter()
            .zip(&totals.line_totals)
            .enumerate()
            .map(|(i, (line, total))| SaleItem {
                id: new_id(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                sku_snapshot: line.sku.clone(),
                name_snapshot: line.name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                discount_cents: line.discount_cents,
                line_total_cents: total.cents(),
                line_no: i as i64 + 1,
            })
            .collect();

        let sale = Sale {
            id: sale_id,
            receipt_number: receipt_number(&store.code, now, &short_code()),
            customer_id: customer.id.clone(),
            store_id: store.id.clone(),
            user_id: Some(user.user_id.clone()),
            status,
            payment_method: request.payment_method,
            subtotal_cents: totals.subtotal.cents(),
            discount_cents: totals.discount.cents(),
            tax_rate_bps: i64::from(self.tax_rate.bps()),
            tax_cents: totals.tax.cents(),
            total_cents: totals.total.cents(),
            refunded_cents: 0,
            stock_restored: false,
            notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            is_active: true,
            created_at: now,
            updated_at: now,
            completed_at: (status == SaleStatus::Completed).then_some(now),
            items,
            refunds: Vec::new(),
        };

        let receipts = plan_sale_receipt(&sale, &customer, &store.name);

        let mut tx = self.db.begin().await?;
        let result = Self::persist_in(&mut tx, &sale, &reservations, &receipts).await;
        let pending = match finish(tx, result).await {
            Ok(pending) => pending,
            Err(e) => {
                self.db.inventory().release_all(&reservations).await;
                return Err(e);
            }
        };

        info!(
            sale_id = %sale.id,
            receipt = %sale.receipt_number,
            total_cents = sale.total_cents,
            lines = sale.items.len(),
            "Sale recorded"
        );

        self.notifier.enqueue(pending);
        self.load(&sale.id).await
    }

    /// Reserves lines in order; the first shortfall releases what was held.
    async fn reserve_lines(&self, lines: &[LineDraft], store_id: &str) -> Result<Vec<Reservation>, ApiError> {
        let ledger = self.db.inventory();
        let mut held = Vec::with_capacity(lines.len());

        for line in lines {
            match ledger.reserve(&line.product_id, store_id, line.quantity).await {
                Ok(reservation) => held.push(reservation),
                Err(e) => {
                    ledger.release_all(&held).await;
                    return Err(e.into());
                }
            }
        }

        Ok(held)
    }

    async fn persist_in(
        tx: &mut Transaction<'static, Sqlite>,
        sale: &Sale,
        reservations: &[Reservation],
        receipts: &[OutboxDraft],
    ) -> DbResult<Vec<String>> {
        SaleRepository::insert_in(tx, sale).await?;

        for reservation in reservations {
            InventoryLedger::commit_in(tx, reservation).await?;
        }

        CustomerRepository::add_purchase_in(
            tx,
            &sale.customer_id,
            sale.total_cents,
            loyalty_points_for(sale.total()),
        )
        .await?;

        write_outbox(tx, receipts).await
    }

    // =========================================================================
    // Status and refunds
    // =========================================================================

    /// Applies `PUT /sales/:id/status`.
    ///
    /// Only `completed` (from `pending`) and `cancelled` may be requested;
    /// the refund states follow from refunds.
    pub async fn change_status(&self, id: &str, status: &str, user: &AuthUser) -> Result<Sale, ApiError> {
        let target = SaleStatus::from_str(status)?;
        let sale = self.get(id, user).await?;

        let change = plan_status_change(sale.status, target)?;

        let receipts = match change {
            StatusChange::Update(SaleStatus::Completed) => self.completion_receipts(&sale).await?,
            _ => Vec::new(),
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let result: DbResult<Vec<String>> = async {
            match change {
                StatusChange::Unchanged => Ok(Vec::new()),
                StatusChange::Cancel => {
                    SaleRepository::update_status_in(&mut tx, &sale.id, sale.status, SaleStatus::Cancelled, now)
                        .await?;
                    Self::restore_stock_in(&mut tx, &sale).await?;
                    Ok(Vec::new())
                }
                StatusChange::Update(next) => {
                    SaleRepository::update_status_in(&mut tx, &sale.id, sale.status, next, now).await?;
                    write_outbox(&mut tx, &receipts).await
                }
            }
        }
        .await;

        let pending = finish(tx, result).await?;

        if change != StatusChange::Unchanged {
            info!(sale_id = %sale.id, from = %sale.status, to = %target, "Sale status changed");
        }

        self.notifier.enqueue(pending);
        self.load(&sale.id).await
    }

    /// Records a refund against a completed or partially refunded sale.
    pub async fn refund(&self, id: &str, request: RefundRequest, user: &AuthUser) -> Result<Sale, ApiError> {
        validate_text("reason", &request.reason, 500)?;

        let sale = self.get(id, user).await?;
        let plan = sale.plan_refund(Money::from_cents(request.amount_cents))?;

        let refund = Refund {
            id: new_id(),
            sale_id: sale.id.clone(),
            amount_cents: request.amount_cents,
            reason: request.reason.trim().to_string(),
            refunded_by: Some(user.user_id.clone()),
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;
        let result: DbResult<bool> = async {
            SaleRepository::apply_refund_in(&mut tx, &sale, &refund, &plan).await?;
            if plan.is_full() && request.restock {
                return Self::restore_stock_in(&mut tx, &sale).await;
            }
            Ok(false)
        }
        .await;

        let restocked = finish(tx, result).await?;

        info!(
            sale_id = %sale.id,
            amount_cents = refund.amount_cents,
            status = %plan.status_after,
            restocked,
            "Refund recorded"
        );

        self.load(&sale.id).await
    }

    /// Flips `stock_restored` and, if this call won the flip, returns every
    /// line to stock. Returns whether stock moved.
    async fn restore_stock_in(tx: &mut Transaction<'static, Sqlite>, sale: &Sale) -> DbResult<bool> {
        if !SaleRepository::mark_stock_restored_in(tx, &sale.id).await? {
            return Ok(false);
        }

        for item in &sale.items {
            InventoryLedger::restock_in(tx, &item.product_id, &sale.store_id, item.quantity).await?;
        }
        Ok(true)
    }

    /// Receipt rows for a pending sale that is about to complete.
    async fn completion_receipts(&self, sale: &Sale) -> Result<Vec<OutboxDraft>, ApiError> {
        let Some(customer) = self.db.customers().get_by_id(&sale.customer_id).await? else {
            return Ok(Vec::new());
        };
        let store_name = self
            .db
            .stores()
            .get_by_id(&sale.store_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_default();

        let mut completed = sale.clone();
        completed.status = SaleStatus::Completed;
        Ok(plan_sale_receipt(&completed, &customer, &store_name))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &str, user: &AuthUser) -> Result<Sale, ApiError> {
        let sale = self.load(id).await?;
        user.ensure_store(&sale.store_id)?;
        Ok(sale)
    }

    pub async fn list(&self, filter: SaleFilter, user: &AuthUser) -> Result<Vec<Sale>, ApiError> {
        let filter = SaleFilter {
            store_id: user.scope_store(filter.store_id)?,
            ..filter
        };
        Ok(self.db.sales().list(&filter).await?)
    }

    async fn load(&self, id: &str) -> Result<Sale, ApiError> {
        self.db
            .sales()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use nexus_core::{CustomerProfile, Product, Store, UserRole, DEFAULT_TAX_RATE_BPS};
    use nexus_db::{DbConfig, NewUser};
    use nexus_notify::{ChannelSet, Dispatcher};

    use crate::services::products::{NewProduct, ProductService};

    struct Fixture {
        db: Database,
        sales: SaleCoordinator,
        store: Store,
        admin: AuthUser,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.stores().create("BLR01", "Bengaluru", None, None).await.unwrap();
        let notifier = Dispatcher::new(db.clone(), ChannelSet::logging()).start();
        let sales = SaleCoordinator::new(db.clone(), TaxRate::from_bps(DEFAULT_TAX_RATE_BPS), notifier);
        // sales.user_id references users(id)
        let cashier = db
            .users()
            .create(NewUser {
                name: "Asha Rao".into(),
                email: "asha@example.com".into(),
                phone: None,
                password_hash: "$argon2id$unused".into(),
                role: UserRole::Admin,
                store_id: None,
            })
            .await
            .unwrap();
        let admin = AuthUser {
            user_id: cashier.id,
            role: UserRole::Admin,
            store_id: None,
        };
        Fixture {
            db,
            sales,
            store,
            admin,
        }
    }

    async fn stocked(f: &Fixture, sku: &str, price_cents: i64, stock: i64) -> Product {
        let product = ProductService::new(f.db.clone())
            .create(NewProduct {
                sku: Some(sku.into()),
                barcode: None,
                name: format!("Laptop {}", sku),
                brand: None,
                model: None,
                category: None,
                description: None,
                price_cents,
                cost_cents: None,
                low_stock_threshold: None,
            })
            .await
            .unwrap()
            .product;
        f.db.inventory()
            .set_stock(&product.id, &f.store.id, stock, None)
            .await
            .unwrap();
        product
    }

    fn request(store_id: &str, lines: &[(&str, i64)]) -> CreateSaleRequest {
        CreateSaleRequest {
            customer: CustomerRef::Inline(CustomerProfile {
                name: Some("Ravi Kumar".into()),
                phone: Some("9876543210".into()),
                ..Default::default()
            }),
            store_id: store_id.to_string(),
            items: lines
                .iter()
                .map(|(product_id, quantity)| SaleLineRequest {
                    product_id: product_id.to_string(),
                    quantity: *quantity,
                    unit_price_cents: None,
                    discount_cents: 0,
                })
                .collect(),
            payment_method: PaymentMethod::Upi,
            status: None,
            notes: None,
        }
    }

    async fn stock_of(f: &Fixture, product: &Product) -> (i64, i64) {
        let level = f
            .db
            .inventory()
            .level(&product.id, &f.store.id)
            .await
            .unwrap()
            .unwrap();
        (level.stock, level.reserved)
    }

    #[tokio::test]
    async fn test_sale_commits_stock_and_awards_points() {
        let f = fixture().await;
        let laptop = stocked(&f, "LAP-001", 50_000_00, 5).await;

        let sale = f
            .sales
            .create(request(&f.store.id, &[(&laptop.id, 2)]), &f.admin)
            .await
            .unwrap();

        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sale.subtotal_cents, 100_000_00);
        assert_eq!(sale.tax_cents, 18_000_00);
        assert_eq!(sale.total_cents, 118_000_00);
        assert!(sale.receipt_number.starts_with("S-BLR01-"));
        assert_eq!(stock_of(&f, &laptop).await, (3, 0));

        let customer = f.db.customers().get_by_id(&sale.customer_id).await.unwrap().unwrap();
        assert_eq!(customer.loyalty_points, 1180);
        assert_eq!(customer.total_purchases_cents, 118_000_00);
        assert_eq!(f.db.inventory().outstanding_holds().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_stock_line_changes_nothing() {
        let f = fixture().await;
        let in_stock = stocked(&f, "LAP-001", 50_000_00, 5).await;
        let sold_out = stocked(&f, "LAP-002", 70_000_00, 0).await;

        let err = f
            .sales
            .create(request(&f.store.id, &[(&in_stock.id, 2), (&sold_out.id, 1)]), &f.admin)
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(stock_of(&f, &in_stock).await, (5, 0));
        assert_eq!(stock_of(&f, &sold_out).await, (0, 0));
        assert_eq!(f.db.inventory().outstanding_holds().await.unwrap(), 0);
        assert!(f.db.sales().list(&SaleFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelling_twice_restores_stock_once() {
        let f = fixture().await;
        let laptop = stocked(&f, "LAP-001", 50_000_00, 5).await;
        let sale = f
            .sales
            .create(request(&f.store.id, &[(&laptop.id, 2)]), &f.admin)
            .await
            .unwrap();

        let cancelled = f.sales.change_status(&sale.id, "cancelled", &f.admin).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert!(cancelled.stock_restored);
        assert_eq!(stock_of(&f, &laptop).await, (5, 0));

        f.sales.change_status(&sale.id, "cancelled", &f.admin).await.unwrap();
        assert_eq!(stock_of(&f, &laptop).await, (5, 0));

        let err = f.sales.change_status(&sale.id, "completed", &f.admin).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatusTransition);
    }

    #[tokio::test]
    async fn test_pending_sale_completes_later() {
        let f = fixture().await;
        let laptop = stocked(&f, "LAP-001", 50_000_00, 5).await;
        let mut req = request(&f.store.id, &[(&laptop.id, 1)]);
        req.status = Some("pending".into());

        let sale = f.sales.create(req, &f.admin).await.unwrap();
        assert_eq!(sale.status, SaleStatus::Pending);
        assert!(sale.completed_at.is_none());
        assert_eq!(stock_of(&f, &laptop).await, (4, 0));

        let done = f.sales.change_status(&sale.id, "completed", &f.admin).await.unwrap();
        assert_eq!(done.status, SaleStatus::Completed);
        assert!(done.completed_at.is_some());

        let err = f.sales.change_status(&sale.id, "refunded", &f.admin).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);

        let err = f.sales.change_status(&sale.id, "shipped", &f.admin).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStatus);
    }

    #[tokio::test]
    async fn test_refunds_until_exhausted() {
        let f = fixture().await;
        let laptop = stocked(&f, "LAP-001", 50_000_00, 5).await;
        let sale = f
            .sales
            .create(request(&f.store.id, &[(&laptop.id, 1)]), &f.admin)
            .await
            .unwrap();

        let refund = |amount_cents| RefundRequest {
            amount_cents,
            reason: "Dead pixel".into(),
            restock: true,
        };

        let partial = f.sales.refund(&sale.id, refund(10_000_00), &f.admin).await.unwrap();
        assert_eq!(partial.status, SaleStatus::PartiallyRefunded);
        assert_eq!(partial.refunds.len(), 1);
        assert_eq!(stock_of(&f, &laptop).await, (4, 0));

        let err = f
            .sales
            .refund(&sale.id, refund(sale.total_cents), &f.admin)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RefundNotAllowed);

        let rest = sale.total_cents - 10_000_00;
        let full = f.sales.refund(&sale.id, refund(rest), &f.admin).await.unwrap();
        assert_eq!(full.status, SaleStatus::Refunded);
        assert_eq!(full.refunded_cents, sale.total_cents);
        assert_eq!(stock_of(&f, &laptop).await, (5, 0));

        let err = f.sales.refund(&sale.id, refund(1), &f.admin).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RefundNotAllowed);
    }

    #[tokio::test]
    async fn test_staff_cannot_sell_for_another_store() {
        let f = fixture().await;
        let laptop = stocked(&f, "LAP-001", 50_000_00, 5).await;
        let staff = AuthUser {
            user_id: "staff-1".into(),
            role: UserRole::Staff,
            store_id: Some("elsewhere".into()),
        };

        let err = f
            .sales
            .create(request(&f.store.id, &[(&laptop.id, 1)]), &staff)
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::FORBIDDEN);
        assert_eq!(stock_of(&f, &laptop).await, (5, 0));
    }
}
