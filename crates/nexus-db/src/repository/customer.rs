//! # Customer Repository
//!
//! Customer persistence, deduplication by contact and search.
//!
//! ## Find-or-Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  profile { name, email, phone, ... } (normalised)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT ... WHERE email = ? OR phone = ?                               │
//! │       │                                                                 │
//! │       ├── found ──► merge supplied fields ──► UPDATE if changed        │
//! │       │             (except a contact another customer holds)         │
//! │       │                                                                 │
//! │       └── none  ──► INSERT                                             │
//! │                      │                                                  │
//! │                      └── UNIQUE race lost? ──► look up again           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::new_id;
use nexus_core::contact::normalize_phone;
use nexus_core::{Customer, CustomerProfile};

const CUSTOMER_COLUMNS: &str = r#"
    id, name, email, phone,
    address_line, city, state, postal_code,
    loyalty_points, total_purchases_cents, notifications_opt_in,
    is_active, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets an active customer.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE id = ?1 AND is_active = 1",
            CUSTOMER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Finds an active customer by normalised email or phone. An email match
    /// wins over a phone match.
    pub async fn find_by_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> DbResult<Option<Customer>> {
        if email.is_none() && phone.is_none() {
            return Ok(None);
        }

        let customer = sqlx::query_as::<_, Customer>(&format!(
            r#"
            SELECT {} FROM customers
            WHERE is_active = 1
              AND ((?1 IS NOT NULL AND email = ?1) OR (?2 IS NOT NULL AND phone = ?2))
            ORDER BY CASE WHEN email = ?1 THEN 0 ELSE 1 END
            LIMIT 1
            "#,
            CUSTOMER_COLUMNS
        ))
        .bind(email)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Inserts a new customer.
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, email, phone,
                address_line, city, state, postal_code,
                loyalty_points, total_purchases_cents, notifications_opt_in,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address.address_line)
        .bind(&customer.address.city)
        .bind(&customer.address.state)
        .bind(&customer.address.postal_code)
        .bind(customer.loyalty_points)
        .bind(customer.total_purchases_cents)
        .bind(customer.notifications_opt_in)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Writes the profile fields of an existing customer. Loyalty and
    /// purchase totals are only changed through [`Self::add_purchase_in`].
    pub async fn update_profile(&self, customer: &Customer) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                name = ?2, email = ?3, phone = ?4,
                address_line = ?5, city = ?6, state = ?7, postal_code = ?8,
                notifications_opt_in = ?9, updated_at = ?10
            WHERE id = ?1 AND is_active = 1
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address.address_line)
        .bind(&customer.address.city)
        .bind(&customer.address.state)
        .bind(&customer.address.postal_code)
        .bind(customer.notifications_opt_in)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", &customer.id));
        }

        Ok(())
    }

    /// Soft delete.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE customers SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    /// Resolves a profile to a customer, creating one when no email/phone
    /// matches. Expects a normalised profile with at least one contact key.
    ///
    /// ## Returns
    /// `(customer, created)`.
    pub async fn find_or_create(&self, profile: &CustomerProfile) -> DbResult<(Customer, bool)> {
        if let Some(existing) = self.merge_existing(profile).await? {
            return Ok((existing, false));
        }

        let customer = Customer::from_profile(new_id(), profile, Utc::now());
        match self.insert(&customer).await {
            Ok(()) => {
                info!(id = %customer.id, "Created customer");
                Ok((customer, true))
            }
            // Lost a race against a concurrent create with the same contact.
            Err(e) if e.is_unique_violation() => match self.merge_existing(profile).await? {
                Some(existing) => Ok((existing, false)),
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn merge_existing(&self, profile: &CustomerProfile) -> DbResult<Option<Customer>> {
        let Some(mut existing) = self
            .find_by_contact(profile.email.as_deref(), profile.phone.as_deref())
            .await?
        else {
            return Ok(None);
        };

        // Contact keys held by another active customer stay where they are.
        let mut profile = profile.clone();
        if let Some(email) = profile.email.as_deref() {
            if self.contact_taken("email", email, &existing.id).await? {
                warn!(id = %existing.id, "Email belongs to another customer, not merging it");
                profile.email = None;
            }
        }
        if let Some(phone) = profile.phone.as_deref() {
            if self.contact_taken("phone", phone, &existing.id).await? {
                warn!(id = %existing.id, "Phone belongs to another customer, not merging it");
                profile.phone = None;
            }
        }

        if profile.merge_into(&mut existing) {
            debug!(id = %existing.id, "Merging profile into existing customer");
            self.update_profile(&existing).await?;
        }

        Ok(Some(existing))
    }

    /// Whether an active customer other than `except_id` holds the value.
    /// `column` is `"email"` or `"phone"`.
    async fn contact_taken(&self, column: &'static str, value: &str, except_id: &str) -> DbResult<bool> {
        let taken: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT 1 FROM customers WHERE is_active = 1 AND {} = ?1 AND id <> ?2 LIMIT 1",
            column
        ))
        .bind(value)
        .bind(except_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(taken.is_some())
    }

    /// Case-insensitive substring search over name, email and phone.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Customer>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list(limit).await;
        }

        let text_pattern = format!("%{}%", query.to_lowercase());
        let digits = normalize_phone(query);
        let phone_pattern = if digits.is_empty() {
            None
        } else {
            Some(format!("%{}%", digits))
        };

        let customers = sqlx::query_as::<_, Customer>(&format!(
            r#"
            SELECT {} FROM customers
            WHERE is_active = 1
              AND (LOWER(name) LIKE ?1
                   OR email LIKE ?1
                   OR (?2 IS NOT NULL AND phone LIKE ?2))
            ORDER BY name
            LIMIT ?3
            "#,
            CUSTOMER_COLUMNS
        ))
        .bind(&text_pattern)
        .bind(&phone_pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Most recently created active customers.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {} FROM customers WHERE is_active = 1 ORDER BY created_at DESC LIMIT ?1",
            CUSTOMER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    /// Adds a sale's total and loyalty points, inside the sale transaction.
    pub async fn add_purchase_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        total_cents: i64,
        points: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customers SET
                total_purchases_cents = total_purchases_cents + ?2,
                loyalty_points = loyalty_points + ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(customer_id)
        .bind(total_cents)
        .bind(points)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", customer_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
