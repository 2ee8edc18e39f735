use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use nexus_core::{Customer, CustomerProfile};

use crate::auth::AuthUser;
use crate::extract::{page_limit, ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use crate::services::CustomerHistory;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub search: Option<String>,
    pub limit: Option<u32>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", get(list_customers).post(create_customer))
        .route(
            "/customers/{id}",
            get(get_customer).put(update_customer).delete(delete_customer),
        )
        .route("/customers/{id}/history", get(customer_history))
}

async fn list_customers(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<CustomerQuery>,
) -> ApiResult<Vec<Customer>> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let customers = state.customers.search(search, page_limit(query.limit)).await?;
    Ok(ApiResponse::ok(customers))
}

async fn create_customer(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiJson(profile): ApiJson<CustomerProfile>,
) -> ApiResult<Customer> {
    Ok(ApiResponse::created(state.customers.create(&profile).await?))
}

async fn get_customer(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Customer> {
    Ok(ApiResponse::ok(state.customers.get(&id).await?))
}

async fn update_customer(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
    ApiJson(profile): ApiJson<CustomerProfile>,
) -> ApiResult<Customer> {
    Ok(ApiResponse::ok(state.customers.update(&id, &profile).await?))
}

async fn delete_customer(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.customers.delete(&id).await?;
    Ok(ApiResponse::ok(()))
}

async fn customer_history(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<CustomerHistory> {
    Ok(ApiResponse::ok(state.customers.history(&id).await?))
}
