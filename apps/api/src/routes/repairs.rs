//! Repair tickets. `/repairs/track/status` is the only public route here.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;

use nexus_core::repair::{RepairIntake, RepairUpdate};
use nexus_core::{Repair, RepairNote, RepairStatus};
use nexus_db::RepairFilter;

use crate::auth::AuthUser;
use crate::extract::{page_limit, ApiJson, ApiQuery};
use crate::response::{ApiResponse, ApiResult};
use crate::services::TrackedRepair;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RepairQuery {
    pub store_id: Option<String>,
    pub status: Option<String>,
    pub customer_id: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub ticket: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub note: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/repairs", get(list_repairs).post(create_repair))
        .route("/repairs/track/status", get(track_repair))
        .route("/repairs/{id}", get(get_repair).put(update_repair))
        .route("/repairs/{id}/status", put(change_status))
        .route("/repairs/{id}/notes", post(add_note))
        .route("/repairs/{id}/notify", post(notify_customer))
}

async fn create_repair(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(intake): ApiJson<RepairIntake>,
) -> ApiResult<Repair> {
    Ok(ApiResponse::created(state.repairs.intake(intake, &user).await?))
}

async fn list_repairs(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<RepairQuery>,
) -> ApiResult<Vec<Repair>> {
    let status = query.status.as_deref().map(RepairStatus::from_str).transpose()?;
    let filter = RepairFilter {
        store_id: query.store_id,
        status,
        customer_id: query.customer_id,
        limit: page_limit(query.limit),
    };
    Ok(ApiResponse::ok(state.repairs.list(filter, &user).await?))
}

async fn track_repair(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<TrackQuery>,
) -> ApiResult<Vec<TrackedRepair>> {
    let found = state
        .repairs
        .track(query.ticket.as_deref(), query.phone.as_deref(), query.email.as_deref())
        .await?;
    Ok(ApiResponse::ok(found))
}

async fn get_repair(State(state): State<Arc<AppState>>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Repair> {
    Ok(ApiResponse::ok(state.repairs.get(&id, &user).await?))
}

async fn update_repair(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<RepairUpdate>,
) -> ApiResult<Repair> {
    Ok(ApiResponse::ok(state.repairs.update(&id, update, &user).await?))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<TransitionRequest>,
) -> ApiResult<Repair> {
    let repair = state
        .repairs
        .transition(&id, &req.status, req.note.as_deref(), &user)
        .await?;
    Ok(ApiResponse::ok(repair))
}

async fn add_note(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<NoteRequest>,
) -> ApiResult<RepairNote> {
    Ok(ApiResponse::created(state.repairs.add_note(&id, &req.note, &user).await?))
}

async fn notify_customer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Repair> {
    Ok(ApiResponse::ok(state.repairs.notify(&id, &user).await?))
}
