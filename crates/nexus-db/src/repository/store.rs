//! # Store Repository

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::new_id;
use nexus_core::Store;

const STORE_COLUMNS: &str = "id, code, name, address, phone, is_active, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    /// Creates a store. The code is stored upper-cased.
    pub async fn create(
        &self,
        code: &str,
        name: &str,
        address: Option<&str>,
        phone: Option<&str>,
    ) -> DbResult<Store> {
        let now = Utc::now();
        let store = Store {
            id: new_id(),
            code: code.trim().to_uppercase(),
            name: name.trim().to_string(),
            address: address.map(str::to_string),
            phone: phone.map(str::to_string),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %store.id, code = %store.code, "Creating store");

        sqlx::query(
            r#"
            INSERT INTO stores (id, code, name, address, phone, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&store.id)
        .bind(&store.code)
        .bind(&store.name)
        .bind(&store.address)
        .bind(&store.phone)
        .bind(store.is_active)
        .bind(store.created_at)
        .bind(store.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(store)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {} FROM stores WHERE id = ?1 AND is_active = 1",
            STORE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(store)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Store>> {
        let store = sqlx::query_as::<_, Store>(&format!(
            "SELECT {} FROM stores WHERE code = ?1 AND is_active = 1",
            STORE_COLUMNS
        ))
        .bind(code.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(store)
    }

    /// Active stores ordered by code.
    pub async fn list(&self) -> DbResult<Vec<Store>> {
        let stores = sqlx::query_as::<_, Store>(&format!(
            "SELECT {} FROM stores WHERE is_active = 1 ORDER BY code",
            STORE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(stores)
    }
}
