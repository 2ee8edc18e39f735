//! # Database Errors
//!
//! ```text
//!   sqlx::Error ─── From ───┐
//!                           ├──► DbError ──► ApiError (status + code)
//!   CoreError ──── Core ────┘
//!   (ledger and refund rules)
//! ```
//!
//! Constraint failures are classified with `ErrorKind`, so a duplicate
//! email surfaces as `UniqueViolation { field: "email" }` and the API can
//! answer 409 without inspecting SQL text.

use nexus_core::CoreError;
use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Missing or soft-deleted row.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `value` is empty when the violation came from SQLite itself.
    #[error("Duplicate {field}")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Includes CHECK failures such as `stock >= reserved`.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A conditional write found the row already changed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Duplicate detected before the insert, with the offending value.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation => DbError::UniqueViolation {
                    field: violated_column(db_err.message()),
                    value: String::new(),
                },
                ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation {
                    message: db_err.message().to_string(),
                },
                _ => DbError::QueryFailed(db_err.message().to_string()),
            },
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// `"UNIQUE constraint failed: customers.email"` → `"email"`.
fn violated_column(message: &str) -> String {
    message
        .rsplit(": ")
        .next()
        .and_then(|cols| cols.split(',').next())
        .and_then(|col| col.trim().rsplit('.').next())
        .filter(|col| !col.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violated_column() {
        assert_eq!(violated_column("UNIQUE constraint failed: customers.email"), "email");
        assert_eq!(
            violated_column("UNIQUE constraint failed: inventory.product_id, inventory.store_id"),
            "product_id"
        );
        assert_eq!(violated_column(""), "unknown");
    }
}
