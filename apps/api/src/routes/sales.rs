use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;

use nexus_core::{Sale, SaleStatus};
use nexus_db::SaleFilter;

use crate::auth::AuthUser;
use crate::extract::{page_limit, ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use crate::services::{CreateSaleRequest, RefundRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SaleQuery {
    pub store_id: Option<String>,
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sales", get(list_sales).post(create_sale))
        .route("/sales/{id}", get(get_sale))
        .route("/sales/{id}/status", put(change_status))
        .route("/sales/{id}/refund", post(refund_sale))
}

async fn create_sale(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateSaleRequest>,
) -> ApiResult<Sale> {
    Ok(ApiResponse::created(state.sales.create(req, &user).await?))
}

async fn list_sales(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<SaleQuery>,
) -> ApiResult<Vec<Sale>> {
    let status = query.status.as_deref().map(SaleStatus::from_str).transpose()?;
    let filter = SaleFilter {
        store_id: query.store_id,
        status,
        customer_id: query.customer_id,
        limit: page_limit(query.limit),
    };
    Ok(ApiResponse::ok(state.sales.list(filter, &user).await?))
}

async fn get_sale(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Sale> {
    Ok(ApiResponse::ok(state.sales.get(&id, &user).await?))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> ApiResult<Sale> {
    Ok(ApiResponse::ok(state.sales.change_status(&id, &req.status, &user).await?))
}

async fn refund_sale(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RefundRequest>,
) -> ApiResult<Sale> {
    Ok(ApiResponse::ok(state.sales.refund(&id, req, &user).await?))
}
