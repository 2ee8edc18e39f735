//! # Staff Authentication
//!
//! HS256 access tokens and argon2 password hashes.
//!
//! ```text
//! POST /auth/login ──► find_credentials ──► verify_password ──► JwtManager::issue
//!
//! Authorization: Bearer <jwt>
//!        │
//!        ▼
//!  AuthUser extractor ──► JwtManager::validate ──► handler
//!        │
//!        └── ensure_store(id): admin, or id == home store, else 403
//! ```

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use nexus_core::{User, UserRole};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email/phone or password")]
    InvalidCredentials,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("No access to store {store_id}")]
    StoreAccessDenied { store_id: String },

    #[error("Administrator role required")]
    AdminRequired,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Failed to generate token: {0}")]
    TokenCreation(String),
}

// =============================================================================
// Tokens
// =============================================================================

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub role: UserRole,
    /// Home store; `None` for admins without one.
    pub store_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        JwtManager {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Issues an access token for `user`.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            store_id: user.store_id.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.lifetime_secs)).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

/// Extracts the token from an `Authorization` header value.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Passwords
// =============================================================================

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// =============================================================================
// Extractor
// =============================================================================

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: UserRole,
    pub store_id: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Admins reach every store; everyone else only their home store.
    pub fn ensure_store(&self, store_id: &str) -> Result<(), AuthError> {
        if self.is_admin() || self.store_id.as_deref() == Some(store_id) {
            Ok(())
        } else {
            Err(AuthError::StoreAccessDenied {
                store_id: store_id.to_string(),
            })
        }
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AuthError::AdminRequired)
        }
    }

    /// Store filter for list endpoints: non-admins are pinned to their home
    /// store and may not ask for another.
    pub fn scope_store(&self, requested: Option<String>) -> Result<Option<String>, AuthError> {
        if self.is_admin() {
            return Ok(requested);
        }

        match (requested, &self.store_id) {
            (Some(store_id), _) => {
                self.ensure_store(&store_id)?;
                Ok(Some(store_id))
            }
            (None, Some(home)) => Ok(Some(home.clone())),
            (None, None) => Err(AuthError::StoreAccessDenied {
                store_id: "(none)".to_string(),
            }),
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            user_id: claims.sub,
            role: claims.role,
            store_id: claims.store_id,
        }
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = extract_bearer_token(header).ok_or(AuthError::MissingToken)?;
        let claims = state.jwt.validate(token)?;

        Ok(claims.into())
    }
}

/// `Option<AuthUser>`: `None` without an Authorization header; a header
/// carrying a bad token is still rejected.
impl OptionalFromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(None);
        }

        <AuthUser as FromRequestParts<Arc<AppState>>>::from_request_parts(parts, state)
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole, store_id: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: "user-1".into(),
            name: "Asha".into(),
            email: "asha@example.com".into(),
            phone: None,
            role,
            store_id: store_id.map(str::to_string),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_roundtrip() {
        let jwt = JwtManager::new("test-secret", 3600);
        let token = jwt.issue(&user(UserRole::Staff, Some("store-1"))).unwrap();

        let claims = jwt.validate(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, UserRole::Staff);
        assert_eq!(claims.store_id.as_deref(), Some("store-1"));
    }

    #[test]
    fn test_token_from_other_secret_is_rejected() {
        let token = JwtManager::new("secret-a", 3600)
            .issue(&user(UserRole::Admin, None))
            .unwrap();
        assert!(matches!(
            JwtManager::new("secret-b", 3600).validate(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_store_scoping() {
        let staff = AuthUser {
            user_id: "u".into(),
            role: UserRole::Staff,
            store_id: Some("blr".into()),
        };
        assert!(staff.ensure_store("blr").is_ok());
        assert!(staff.ensure_store("pun").is_err());
        assert_eq!(staff.scope_store(None).unwrap().as_deref(), Some("blr"));
        assert!(staff.scope_store(Some("pun".into())).is_err());

        let admin = AuthUser {
            user_id: "a".into(),
            role: UserRole::Admin,
            store_id: None,
        };
        assert!(admin.ensure_store("pun").is_ok());
        assert_eq!(admin.scope_store(None).unwrap(), None);
    }

    #[test]
    fn test_bearer_prefix() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}
