use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::info;

use nexus_core::validation::{validate_optional_text, validate_phone, validate_store_code, validate_text};
use nexus_core::{Store, ValidationErrors};

use crate::auth::AuthUser;
use crate::extract::ApiJson;
use crate::response::{ApiResponse, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NewStore {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stores", get(list_stores).post(create_store))
}

async fn list_stores(State(state): State<Arc<AppState>>, _user: AuthUser) -> ApiResult<Vec<Store>> {
    Ok(ApiResponse::ok(state.db.stores().list().await?))
}

async fn create_store(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(req): ApiJson<NewStore>,
) -> ApiResult<Store> {
    user.require_admin()?;

    let mut errors = ValidationErrors::new();
    errors.check(validate_store_code(&req.code));
    errors.check(validate_text("name", &req.name, 100));
    errors.check(validate_optional_text("address", req.address.as_deref(), 500));
    if let Some(phone) = req.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        errors.check(validate_phone("phone", phone));
    }
    errors.into_result()?;

    let store = state
        .db
        .stores()
        .create(&req.code, &req.name, req.address.as_deref(), req.phone.as_deref())
        .await?;

    info!(store_id = %store.id, code = %store.code, "Store created");
    Ok(ApiResponse::created(store))
}
