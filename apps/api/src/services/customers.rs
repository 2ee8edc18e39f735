//! # Customer Service
//!
//! Resolves [`CustomerRef`]s for sales and repair intake, and backs the
//! `/customers` routes.

use serde::Serialize;
use tracing::info;

use nexus_core::{Customer, CustomerProfile, CustomerRef, Repair, Sale, ValidationError};
use nexus_db::{new_id, Database, DbError};

use crate::error::ApiError;

/// Customer with everything they bought or brought in.
#[derive(Debug, Serialize)]
pub struct CustomerHistory {
    pub customer: Customer,
    pub sales: Vec<Sale>,
    pub repairs: Vec<Repair>,
}

pub struct CustomerService {
    db: Database,
}

impl CustomerService {
    pub fn new(db: Database) -> Self {
        CustomerService { db }
    }

    /// Turns a reference into a stored customer.
    ///
    /// - `ById`: the active customer, or 404
    /// - `Inline`: find by email/phone and merge, else create
    pub async fn resolve(&self, reference: &CustomerRef) -> Result<Customer, ApiError> {
        match reference {
            CustomerRef::ById(id) => self.get(id).await,
            CustomerRef::Inline(profile) => {
                let profile = profile.normalized();
                profile.validate(true)?;
                profile.require_contact()?;

                let (customer, created) = self.db.customers().find_or_create(&profile).await?;
                if created {
                    info!(customer_id = %customer.id, "Customer created from inline reference");
                }
                Ok(customer)
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Customer, ApiError> {
        self.db
            .customers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("Customer", id))
    }

    /// Creates a customer. A taken email or phone is a conflict, not a merge.
    pub async fn create(&self, profile: &CustomerProfile) -> Result<Customer, ApiError> {
        let profile = profile.normalized();
        profile.validate(true)?;
        profile.require_contact()?;

        let customer = Customer::from_profile(new_id(), &profile, chrono::Utc::now());
        self.db.customers().insert(&customer).await?;

        info!(customer_id = %customer.id, "Customer created");
        Ok(customer)
    }

    pub async fn update(&self, id: &str, profile: &CustomerProfile) -> Result<Customer, ApiError> {
        let profile = profile.normalized();
        profile.validate(false)?;

        let mut customer = self.get(id).await?;
        if profile.merge_into(&mut customer) {
            if customer.email.is_none() && customer.phone.is_none() {
                return Err(ValidationError::required("email or phone").into());
            }
            self.db.customers().update_profile(&customer).await?;
        }

        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.db.customers().soft_delete(id).await.map_err(|e| match e {
            DbError::NotFound { .. } => ApiError::not_found("Customer", id),
            other => other.into(),
        })
    }

    pub async fn search(&self, query: Option<&str>, limit: u32) -> Result<Vec<Customer>, ApiError> {
        let customers = match query {
            Some(q) => self.db.customers().search(q, limit).await?,
            None => self.db.customers().list(limit).await?,
        };
        Ok(customers)
    }

    pub async fn history(&self, id: &str) -> Result<CustomerHistory, ApiError> {
        let customer = self.get(id).await?;
        let sales = self.db.sales().list_for_customer(id).await?;
        let repairs = self.db.repairs().list_for_customer(id).await?;

        Ok(CustomerHistory {
            customer,
            sales,
            repairs,
        })
    }
}
