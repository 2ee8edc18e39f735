//! # Product Repository
//!
//! Catalog entries shared by all stores. Per-store stock lives in the
//! inventory table and is read back through [`ProductRepository::with_stock`].
//!
//! ## Lookup Keys
//! ```text
//! ┌───────────────────────────┬────────────────────────────────────────────┐
//! │ id                        │ get_by_id                                  │
//! │ SKU (upper-cased)         │ get_by_sku, find_by_code                   │
//! │ barcode (EAN/UPC)         │ find_by_code                               │
//! │ name / brand / model text │ search (LIKE)                              │
//! └───────────────────────────┴────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::inventory::InventoryLedger;
use nexus_core::product::normalize_sku;
use nexus_core::{Product, ProductWithStock};

const PRODUCT_COLUMNS: &str = r#"
    id, sku, barcode, name, brand, model, category, description,
    price_cents, cost_cents, low_stock_threshold, is_active, created_at, updated_at
"#;

/// Filters for [`ProductRepository::search`].
#[derive(Debug, Clone, Default)]
pub struct ProductSearch {
    pub query: Option<String>,
    /// Only products stocked (a level row exists) at this store.
    pub store_id: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = ?1 AND is_active = 1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE sku = ?1 AND is_active = 1",
            PRODUCT_COLUMNS
        ))
        .bind(normalize_sku(sku))
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Exact match on barcode, then on SKU.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Product>> {
        let code = code.trim();
        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {} FROM products
            WHERE is_active = 1 AND (barcode = ?1 OR sku = ?2)
            ORDER BY CASE WHEN barcode = ?1 THEN 0 ELSE 1 END
            LIMIT 1
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(code)
        .bind(normalize_sku(code))
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Attaches every per-store inventory level.
    pub async fn with_stock(&self, product: Product) -> DbResult<ProductWithStock> {
        let inventory = InventoryLedger::new(self.pool.clone())
            .levels_for_product(&product.id)
            .await?;
        Ok(ProductWithStock { product, inventory })
    }

    /// Inserts a product. The SKU is stored normalised.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        let mut product = product.clone();
        product.sku = normalize_sku(&product.sku);

        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, barcode, name, brand, model, category, description,
                price_cents, cost_cents, low_stock_threshold, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.model)
        .bind(&product.category)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Updates catalog fields.
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2, barcode = ?3, name = ?4, brand = ?5, model = ?6,
                category = ?7, description = ?8, price_cents = ?9, cost_cents = ?10,
                low_stock_threshold = ?11, updated_at = ?12
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(&product.id)
        .bind(normalize_sku(&product.sku))
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.model)
        .bind(&product.category)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.low_stock_threshold)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Soft-deletes a product.
    ///
    /// ## Why Soft Delete?
    /// Sale items reference products; history must keep resolving them.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Case-insensitive substring search over SKU, barcode, name, brand and
    /// model, optionally restricted to one store. Results carry their stock.
    pub async fn search(&self, filter: &ProductSearch) -> DbResult<Vec<ProductWithStock>> {
        let pattern = filter
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q.to_lowercase()));
        let limit = if filter.limit == 0 { 50 } else { filter.limit };

        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {} FROM products p
            WHERE p.is_active = 1
              AND (?1 IS NULL
                   OR LOWER(p.sku) LIKE ?1
                   OR LOWER(COALESCE(p.barcode, '')) LIKE ?1
                   OR LOWER(p.name) LIKE ?1
                   OR LOWER(COALESCE(p.brand, '')) LIKE ?1
                   OR LOWER(COALESCE(p.model, '')) LIKE ?1)
              AND (?2 IS NULL OR EXISTS (
                   SELECT 1 FROM inventory i WHERE i.product_id = p.id AND i.store_id = ?2))
            ORDER BY p.name
            LIMIT ?3
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(&pattern)
        .bind(&filter.store_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(products.len());
        for product in products {
            results.push(self.with_stock(product).await?);
        }

        Ok(results)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
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

    #[tokio::test]
    async fn test_find_by_code_barcode_or_sku() {
        let db = setup().await;
        let mut p = product(&db, "lap-xps13", 1_200_00).await;
        assert_eq!(p.sku, "LAP-XPS13");

        p.barcode = Some("8901234567890".into());
        db.products().update(&p).await.unwrap();

        let by_barcode = db.products().find_by_code("8901234567890").await.unwrap().unwrap();
        assert_eq!(by_barcode.id, p.id);
        let by_sku = db.products().find_by_code(" lap-xps13 ").await.unwrap().unwrap();
        assert_eq!(by_sku.id, p.id);
        assert!(db.products().find_by_code("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_with_store_filter() {
        let db = setup().await;
        let (s1, stocked_product) = stocked(&db, 3).await;
        let other = product(&db, "LAP-002", 1_000_00).await;
        let s2 = store(&db, "PUN01").await;
        db.inventory().set_stock(&other.id, &s2.id, 1, None).await.unwrap();

        let all = db
            .products()
            .search(&ProductSearch {
                query: Some("laptop".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let at_s1 = db
            .products()
            .search(&ProductSearch {
                store_id: Some(s1.id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(at_s1.len(), 1);
        assert_eq!(at_s1[0].product.id, stocked_product.id);
        assert_eq!(at_s1[0].level_at(&s1.id).unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_duplicate_sku_and_soft_delete() {
        let db = setup().await;
        let p = product(&db, "LAP-001", 100).await;
        let err = db
            .products()
            .insert(&Product {
                id: crate::new_id(),
                ..p.clone()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "sku"));

        db.products().soft_delete(&p.id).await.unwrap();
        assert!(db.products().get_by_id(&p.id).await.unwrap().is_none());
        assert_eq!(db.products().count().await.unwrap(), 0);
    }
}
