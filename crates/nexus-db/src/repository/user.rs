//! # User Repository
//!
//! Staff accounts. The password hash lives only in [`UserCredentials`] and is
//! never part of [`User`].

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::new_id;
use nexus_core::contact::{normalize_email, normalize_phone};
use nexus_core::{User, UserRole};

const USER_COLUMNS: &str =
    "id, name, email, phone, role, store_id, is_active, created_at, updated_at";

/// Input for [`UserRepository::create`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// argon2 PHC string.
    pub password_hash: String,
    pub role: UserRole,
    pub store_id: Option<String>,
}

/// A user row together with its password hash, for login only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Inserts a user with normalised email/phone.
    pub async fn create(&self, new_user: NewUser) -> DbResult<User> {
        let now = Utc::now();
        let user = User {
            id: new_id(),
            name: new_user.name.trim().to_string(),
            email: normalize_email(&new_user.email),
            phone: new_user
                .phone
                .as_deref()
                .map(normalize_phone)
                .filter(|p| !p.is_empty()),
            role: new_user.role,
            store_id: new_user.store_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %user.id, role = %user.role, "Creating user");

        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, email, phone, password_hash, role, store_id,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&new_user.password_hash)
        .bind(user.role)
        .bind(&user.store_id)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?1 AND is_active = 1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Looks up an active user by email (case-insensitive) or phone (digits).
    pub async fn find_credentials(&self, identifier: &str) -> DbResult<Option<UserCredentials>> {
        let email = normalize_email(identifier);
        let phone = normalize_phone(identifier);

        let creds = sqlx::query_as::<_, UserCredentials>(&format!(
            r#"
            SELECT {}, password_hash FROM users
            WHERE is_active = 1 AND (email = ?1 OR (?2 <> '' AND phone = ?2))
            LIMIT 1
            "#,
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(&phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(creds)
    }
}
