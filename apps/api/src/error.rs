//! # API Error Type
//!
//! Every handler returns `Result<_, ApiError>`; the error renders as the
//! failure envelope.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Nexus CRM                              │
//! │                                                                         │
//! │  CoreError ──────┐                                                      │
//! │  (business rule) │                                                      │
//! │                  ├──► ApiError ──► IntoResponse                         │
//! │  DbError ────────┤        │                                             │
//! │  (persistence)   │        │   {                                         │
//! │                  │        │     "success": false,                       │
//! │  AuthError ──────┘        │     "code": "INSUFFICIENT_STOCK",           │
//! │  (token, login)           │     "message": "...",                       │
//! │                           │     "errors": [{field, message}],  (400)    │
//! │                           │     "detail": "..."          (development)  │
//! │                           ▼   }                                         │
//! │                    tracing::error! for 5xx                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `detail` is attached to the response extensions and only written into
//! the body by [`expose_error_detail`], which the router installs in
//! development.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use nexus_core::{CoreError, FieldError, ValidationError, ValidationErrors};
use nexus_db::DbError;

use crate::auth::AuthError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Not enough units to reserve (400)
    InsufficientStock,

    /// Unknown status value (400)
    InvalidStatus,

    /// Status change not allowed from the current status (400)
    InvalidStatusTransition,

    /// Repair is delivered or cancelled (400)
    RepairClosed,

    /// Refund rejected by the refund rules (400)
    RefundNotAllowed,

    /// Missing or bad credentials/token (401)
    Unauthorized,

    /// Authenticated but not allowed (403)
    Forbidden,

    /// Resource not found (404)
    NotFound,

    /// Duplicate key or lost concurrent update (409)
    Conflict,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

/// API error returned from handlers.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub errors: Vec<FieldError>,
    /// Underlying cause; exposed only in development.
    pub detail: Option<String>,
}

/// Failure body. Serialized without `detail` by default.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
            errors: Vec::new(),
            detail: None,
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("{} not found: {}", resource, id),
        )
    }

    pub fn validation(errors: ValidationErrors) -> Self {
        let mut error = ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::ValidationError,
            "Validation failed",
        );
        error.errors = errors.field_errors();
        error
    }

    pub fn bad_request(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::FORBIDDEN, ErrorCode::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::CONFLICT, ErrorCode::Conflict, message)
    }

    pub fn internal(code: ErrorCode, detail: impl Into<String>) -> Self {
        let mut error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            code,
            "An unexpected error occurred",
        );
        error.detail = Some(detail.into());
        error
    }

    fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            code: self.code,
            message: self.message.clone(),
            errors: self.errors.clone(),
            detail: None,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Marker carried in response extensions so the development layer can
/// re-render the body with the cause.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub ErrorBody);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                code = ?self.code,
                message = %self.message,
                detail = ?self.detail,
                "Request failed"
            );
        }

        let body = self.body();
        let mut response = (self.status, Json(&body)).into_response();

        if self.detail.is_some() {
            let mut full = body;
            full.detail = self.detail;
            response.extensions_mut().insert(ErrorDetail(full));
        }

        response
    }
}

/// Rewrites failure bodies to include `detail`. Installed in development.
pub async fn expose_error_detail(mut response: Response) -> Response {
    let Some(ErrorDetail(body)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };

    match serde_json::to_vec(&body) {
        Ok(bytes) => {
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(_) => response,
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::validation(errors)
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        ApiError::validation(error.into())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::InsufficientStock { .. } => {
                ApiError::bad_request(ErrorCode::InsufficientStock, message)
            }
            CoreError::InvalidStatus { .. } => ApiError::bad_request(ErrorCode::InvalidStatus, message),
            CoreError::InvalidStatusTransition { .. } => {
                ApiError::bad_request(ErrorCode::InvalidStatusTransition, message)
            }
            CoreError::RepairClosed { .. } => ApiError::bad_request(ErrorCode::RepairClosed, message),
            CoreError::RefundNotAllowed { .. } | CoreError::RefundExceedsBalance { .. } => {
                ApiError::bad_request(ErrorCode::RefundNotAllowed, message)
            }
            CoreError::Validation(e) => ApiError::validation(e.into()),
            CoreError::ValidationFailed(errors) => ApiError::validation(errors),
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } if value.is_empty() => {
                ApiError::conflict(format!("{} already exists", field))
            }
            DbError::UniqueViolation { field, value } => {
                ApiError::conflict(format!("{} '{}' already exists", field, value))
            }
            DbError::ForeignKeyViolation { message } => {
                let mut error = ApiError::bad_request(ErrorCode::ValidationError, "Invalid reference");
                error.detail = Some(message);
                error
            }
            DbError::TransactionFailed(message) => {
                tracing::warn!(%message, "Concurrent modification");
                ApiError::conflict("The record was modified concurrently; reload and retry")
            }
            DbError::Core(core) => core.into(),
            other => ApiError::internal(ErrorCode::DatabaseError, other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::InvalidToken(_) => {
                ApiError::unauthorized(err.to_string())
            }
            AuthError::StoreAccessDenied { .. } | AuthError::AdminRequired => {
                ApiError::forbidden(err.to_string())
            }
            AuthError::Hashing(_) | AuthError::TokenCreation(_) => {
                ApiError::internal(ErrorCode::Internal, err.to_string())
            }
        }
    }
}
