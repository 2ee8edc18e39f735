//! Login and staff registration.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use nexus_core::validation::{validate_email, validate_password, validate_person_name, validate_phone};
use nexus_core::{User, UserRole, ValidationErrors};
use nexus_db::NewUser;

use crate::auth::{hash_password, verify_password, AuthError, AuthUser};
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::response::{ApiResponse, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Email or phone.
    pub identifier: String,
    pub password: String,
    /// Store the session is opened for.
    #[serde(default)]
    pub store_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
    #[serde(default)]
    pub store_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

/// `data.user` is present either way; `data.token` only for the bootstrap
/// administrator.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Registered {
    Session(TokenResponse),
    Account { user: User },
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
}

fn token_response(state: &AppState, user: User) -> Result<TokenResponse, ApiError> {
    Ok(TokenResponse {
        token: state.jwt.issue(&user)?,
        token_type: "Bearer",
        expires_in: state.jwt.lifetime_secs(),
        user,
    })
}

async fn login(State(state): State<Arc<AppState>>, ApiJson(req): ApiJson<LoginRequest>) -> ApiResult<TokenResponse> {
    let Some(creds) = state.db.users().find_credentials(&req.identifier).await? else {
        warn!("Login for unknown identifier");
        return Err(AuthError::InvalidCredentials.into());
    };

    if !verify_password(&req.password, &creds.password_hash)? {
        warn!(user_id = %creds.user.id, "Login with wrong password");
        return Err(AuthError::InvalidCredentials.into());
    }

    if let Some(store_id) = req.store_id.as_deref() {
        if !creds.user.can_access_store(store_id) {
            return Err(AuthError::StoreAccessDenied {
                store_id: store_id.to_string(),
            }
            .into());
        }
    }

    info!(user_id = %creds.user.id, role = %creds.user.role, "User logged in");
    Ok(ApiResponse::ok(token_response(&state, creds.user)?))
}

/// The first account in an empty system becomes the administrator and gets
/// a session. After that only an administrator may add staff, and the new
/// account signs in on its own.
async fn register(
    State(state): State<Arc<AppState>>,
    caller: Option<AuthUser>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Registered> {
    let bootstrap = state.db.users().count().await? == 0;
    if !bootstrap {
        caller.ok_or(AuthError::MissingToken)?.require_admin()?;
    }

    let mut errors = ValidationErrors::new();
    errors.check(validate_person_name("name", &req.name));
    errors.check(validate_email("email", &req.email));
    if let Some(phone) = req.phone.as_deref().filter(|p| !p.trim().is_empty()) {
        errors.check(validate_phone("phone", phone));
    }
    errors.check(validate_password(&req.password));
    errors.into_result()?;

    if let Some(store_id) = req.store_id.as_deref() {
        state
            .db
            .stores()
            .get_by_id(store_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Store", store_id))?;
    }

    let role = if bootstrap { UserRole::Admin } else { UserRole::Staff };

    let user = state
        .db
        .users()
        .create(NewUser {
            name: req.name,
            email: req.email,
            phone: req.phone,
            password_hash: hash_password(&req.password)?,
            role,
            store_id: req.store_id,
        })
        .await?;

    info!(user_id = %user.id, role = %user.role, "User registered");

    let registered = if bootstrap {
        Registered::Session(token_response(&state, user)?)
    } else {
        Registered::Account { user }
    };
    Ok(ApiResponse::created(registered))
}
