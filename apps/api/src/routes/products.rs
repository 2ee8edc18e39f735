//! Catalog and stock endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;

use nexus_core::{InventoryLevel, ProductWithStock};
use nexus_db::LowStockItem;

use crate::auth::AuthUser;
use crate::extract::{page_limit, ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use crate::services::{NewProduct, ProductChanges};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub store_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub store_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct StockCountRequest {
    pub store_id: String,
    pub stock: i64,
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub store_id: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/products", get(search_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/products/barcode/{code}", get(product_by_code))
        .route("/products/{id}/restock", post(restock_product))
        .route("/products/{id}/stock", put(set_product_stock))
        .route("/inventory/low-stock", get(low_stock))
}

async fn search_products(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> ApiResult<Vec<ProductWithStock>> {
    let products = state
        .products
        .search(query.search, query.store_id, page_limit(query.limit))
        .await?;
    Ok(ApiResponse::ok(products))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiJson(input): ApiJson<NewProduct>,
) -> ApiResult<ProductWithStock> {
    Ok(ApiResponse::created(state.products.create(input).await?))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ProductWithStock> {
    Ok(ApiResponse::ok(state.products.get(&id).await?))
}

async fn product_by_code(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(code): Path<String>,
) -> ApiResult<ProductWithStock> {
    Ok(ApiResponse::ok(state.products.find_by_code(&code).await?))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
    ApiJson(changes): ApiJson<ProductChanges>,
) -> ApiResult<ProductWithStock> {
    Ok(ApiResponse::ok(state.products.update(&id, changes).await?))
}

async fn delete_product(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.products.delete(&id).await?;
    Ok(ApiResponse::ok(()))
}

async fn restock_product(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RestockRequest>,
) -> ApiResult<InventoryLevel> {
    user.ensure_store(&req.store_id)?;
    let level = state.products.restock(&id, &req.store_id, req.quantity).await?;
    Ok(ApiResponse::ok(level))
}

async fn set_product_stock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StockCountRequest>,
) -> ApiResult<InventoryLevel> {
    user.ensure_store(&req.store_id)?;
    let level = state
        .products
        .set_stock(&id, &req.store_id, req.stock, req.low_stock_threshold)
        .await?;
    Ok(ApiResponse::ok(level))
}

async fn low_stock(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<LowStockQuery>,
) -> ApiResult<Vec<LowStockItem>> {
    let store_id = user.scope_store(query.store_id)?;
    Ok(ApiResponse::ok(state.products.low_stock(store_id.as_deref()).await?))
}
