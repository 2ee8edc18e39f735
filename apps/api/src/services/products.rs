//! # Product Service
//!
//! Catalog CRUD plus the manual inventory operations (restock, stock
//! count, low-stock report). Reservations are only taken by the sale
//! coordinator.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use nexus_core::product::{generate_sku, normalize_sku};
use nexus_core::validation::{
    validate_optional_text, validate_price_cents, validate_product_name, validate_quantity,
    validate_sku, validate_stock_count,
};
use nexus_core::{InventoryLevel, Product, ProductWithStock, ValidationErrors, DEFAULT_LOW_STOCK_THRESHOLD};
use nexus_db::{new_id, short_code, Database, LowStockItem, ProductSearch};

use crate::error::ApiError;

/// Body of `POST /products`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
}

/// Body of `PUT /products/:id`. Only supplied fields change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductChanges {
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub cost_cents: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

fn blank_to_none(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn check_fields(
    errors: &mut ValidationErrors,
    sku: Option<&str>,
    name: Option<&str>,
    price_cents: Option<i64>,
    cost_cents: Option<i64>,
    threshold: Option<i64>,
    description: Option<&str>,
) {
    if let Some(sku) = sku {
        errors.check(validate_sku(sku));
    }
    if let Some(name) = name {
        errors.check(validate_product_name(name));
    }
    if let Some(price) = price_cents {
        errors.check(validate_price_cents("price_cents", price));
    }
    if let Some(cost) = cost_cents {
        errors.check(validate_price_cents("cost_cents", cost));
    }
    if let Some(threshold) = threshold {
        errors.check(validate_stock_count("low_stock_threshold", threshold));
    }
    errors.check(validate_optional_text("description", description, 2000));
}

pub struct ProductService {
    db: Database,
}

impl ProductService {
    pub fn new(db: Database) -> Self {
        ProductService { db }
    }

    /// Creates a product, generating `BRAND-MODEL-XXXX` when no SKU is given.
    pub async fn create(&self, input: NewProduct) -> Result<ProductWithStock, ApiError> {
        let sku = blank_to_none(input.sku.as_deref());

        let mut errors = ValidationErrors::new();
        check_fields(
            &mut errors,
            sku.as_deref(),
            Some(&input.name),
            Some(input.price_cents),
            input.cost_cents,
            input.low_stock_threshold,
            input.description.as_deref(),
        );
        errors.into_result()?;

        let sku = match sku {
            Some(sku) => normalize_sku(&sku),
            None => generate_sku(input.brand.as_deref(), input.model.as_deref(), &short_code()[..4]),
        };

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            sku,
            barcode: blank_to_none(input.barcode.as_deref()),
            name: input.name.trim().to_string(),
            brand: blank_to_none(input.brand.as_deref()),
            model: blank_to_none(input.model.as_deref()),
            category: blank_to_none(input.category.as_deref()),
            description: blank_to_none(input.description.as_deref()),
            price_cents: input.price_cents,
            cost_cents: input.cost_cents,
            low_stock_threshold: input.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let product = self.db.products().insert(&product).await?;
        info!(product_id = %product.id, sku = %product.sku, "Product created");

        Ok(ProductWithStock {
            product,
            inventory: Vec::new(),
        })
    }

    pub async fn get(&self, id: &str) -> Result<ProductWithStock, ApiError> {
        let product = self
            .db
            .products()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Product", id))?;
        Ok(self.db.products().with_stock(product).await?)
    }

    /// Exact barcode match, then exact SKU match.
    pub async fn find_by_code(&self, code: &str) -> Result<ProductWithStock, ApiError> {
        let product = self
            .db
            .products()
            .find_by_code(code)
            .await?
            .ok_or_else(|| ApiError::not_found("Product", code))?;
        Ok(self.db.products().with_stock(product).await?)
    }

    pub async fn search(
        &self,
        query: Option<String>,
        store_id: Option<String>,
        limit: u32,
    ) -> Result<Vec<ProductWithStock>, ApiError> {
        let filter = ProductSearch {
            query,
            store_id,
            limit,
        };
        Ok(self.db.products().search(&filter).await?)
    }

    pub async fn update(&self, id: &str, changes: ProductChanges) -> Result<ProductWithStock, ApiError> {
        let mut errors = ValidationErrors::new();
        check_fields(
            &mut errors,
            changes.sku.as_deref(),
            changes.name.as_deref(),
            changes.price_cents,
            changes.cost_cents,
            changes.low_stock_threshold,
            changes.description.as_deref(),
        );
        errors.into_result()?;

        let mut product = self.get(id).await?.product;

        if let Some(sku) = changes.sku {
            product.sku = normalize_sku(&sku);
        }
        if let Some(barcode) = changes.barcode {
            product.barcode = blank_to_none(Some(&barcode));
        }
        if let Some(name) = changes.name {
            product.name = name.trim().to_string();
        }
        if let Some(brand) = changes.brand {
            product.brand = blank_to_none(Some(&brand));
        }
        if let Some(model) = changes.model {
            product.model = blank_to_none(Some(&model));
        }
        if let Some(category) = changes.category {
            product.category = blank_to_none(Some(&category));
        }
        if let Some(description) = changes.description {
            product.description = blank_to_none(Some(&description));
        }
        if let Some(price) = changes.price_cents {
            product.price_cents = price;
        }
        if let Some(cost) = changes.cost_cents {
            product.cost_cents = Some(cost);
        }
        if let Some(threshold) = changes.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }

        self.db.products().update(&product).await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        Ok(self.db.products().soft_delete(id).await?)
    }

    /// Adds received units at a store.
    pub async fn restock(&self, id: &str, store_id: &str, quantity: i64) -> Result<InventoryLevel, ApiError> {
        validate_quantity("quantity", quantity)?;
        self.get(id).await?;
        self.require_store(store_id).await?;

        Ok(self.db.inventory().restock(id, store_id, quantity).await?)
    }

    /// Records a physical count.
    pub async fn set_stock(
        &self,
        id: &str,
        store_id: &str,
        stock: i64,
        threshold: Option<i64>,
    ) -> Result<InventoryLevel, ApiError> {
        self.get(id).await?;
        self.require_store(store_id).await?;

        Ok(self.db.inventory().set_stock(id, store_id, stock, threshold).await?)
    }

    pub async fn low_stock(&self, store_id: Option<&str>) -> Result<Vec<LowStockItem>, ApiError> {
        Ok(self.db.inventory().low_stock(store_id).await?)
    }

    async fn require_store(&self, store_id: &str) -> Result<(), ApiError> {
        self.db
            .stores()
            .get_by_id(store_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("Store", store_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_db::DbConfig;

    fn laptop(sku: Option<&str>) -> NewProduct {
        NewProduct {
            sku: sku.map(str::to_string),
            barcode: Some("8901234567890".into()),
            name: "ThinkPad E14".into(),
            brand: Some("Lenovo".into()),
            model: Some("E14 Gen 5".into()),
            category: Some("laptop".into()),
            description: None,
            price_cents: 62_990_00,
            cost_cents: None,
            low_stock_threshold: None,
        }
    }

    #[tokio::test]
    async fn test_create_generates_sku_and_finds_by_barcode() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let svc = ProductService::new(db);

        let created = svc.create(laptop(None)).await.unwrap();
        assert!(created.product.sku.starts_with("LENOVO-E14GEN5-"));
        assert_eq!(created.product.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);

        let found = svc.find_by_code("8901234567890").await.unwrap();
        assert_eq!(found.product.id, created.product.id);
    }

    #[tokio::test]
    async fn test_restock_and_count() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.stores().create("BLR01", "Bengaluru", None, None).await.unwrap();
        let svc = ProductService::new(db);
        let product = svc.create(laptop(Some("tp-e14"))).await.unwrap().product;
        assert_eq!(product.sku, "TP-E14");

        let level = svc.restock(&product.id, &store.id, 3).await.unwrap();
        assert_eq!(level.stock, 3);
        assert!(level.is_low_stock);

        let level = svc.set_stock(&product.id, &store.id, 12, Some(4)).await.unwrap();
        assert_eq!(level.stock, 12);
        assert!(!level.is_low_stock);

        let err = svc.restock(&product.id, "nowhere", 1).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_price_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let svc = ProductService::new(db);
        let mut input = laptop(None);
        input.price_cents = -1;

        let err = svc.create(input).await.unwrap_err();
        assert_eq!(err.errors[0].field, "price_cents");
    }
}
