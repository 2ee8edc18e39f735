//! # Error Types
//!
//! Domain-specific error types for nexus-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  nexus-core errors (this file)                                         │
//! │  ├── CoreError         - Business rule violations                      │
//! │  ├── ValidationError   - One field failed a check                      │
//! │  └── ValidationErrors  - Every field failure of one request            │
//! │                                                                         │
//! │  nexus-db errors (separate crate)                                      │
//! │  └── DbError           - Database operation failures                   │
//! │                                                                         │
//! │  REST API errors (apps/api)                                            │
//! │  └── ApiError          - What the SPA sees ({success:false,...})       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → HTTP         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule errors.
///
/// Each variant maps to a 4xx response in the API layer. None of them
/// indicate a bug; they are the expected "no" answers of the domain.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Reservation failed because available stock is too low.
    ///
    /// ## When This Occurs
    /// ```text
    /// Sale line: 3 × LAP-DELL-XPS13
    ///      │
    ///      ▼
    /// Ledger: stock=4, reserved=2 → available=2
    ///      │
    ///      ▼
    /// InsufficientStock { sku: "LAP-DELL-XPS13", available: 2, requested: 3 }
    /// ```
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A status string is not part of the allow-list.
    #[error("Invalid status '{value}'. Allowed values: {allowed}")]
    InvalidStatus { value: String, allowed: String },

    /// The status exists but cannot be reached from the current one.
    #[error("Cannot change {entity} status from {from} to {to}")]
    InvalidStatusTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Repair is delivered or cancelled and is frozen.
    #[error("Repair {ticket} is {status} and can no longer be modified")]
    RepairClosed { ticket: String, status: String },

    /// Sale is not in a refundable state.
    #[error("Sale {receipt} cannot be refunded: {reason}")]
    RefundNotAllowed { receipt: String, reason: String },

    /// Refund amount is larger than what is left to refund.
    #[error("Refund of {requested} exceeds refundable balance of {remaining}")]
    RefundExceedsBalance { requested: i64, remaining: i64 },

    /// Single validation failure.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Several validation failures collected from one request.
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationErrors),
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        CoreError::ValidationFailed(errors)
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before anything touches the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::NotAllowed { field, .. } => field,
        }
    }

    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Shorthand for [`ValidationError::InvalidFormat`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Errors (collection)
// =============================================================================

/// A field/message pair as rendered in a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collects every validation failure of one request.
///
/// ## Usage
/// ```rust
/// use nexus_core::validation::{validate_email, validate_person_name};
/// use nexus_core::ValidationErrors;
///
/// let mut errors = ValidationErrors::new();
/// errors.check(validate_person_name("name", ""));
/// errors.check(validate_email("email", "not-an-email"));
/// assert_eq!(errors.len(), 2);
/// assert!(errors.into_result().is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Records the error of a validator result, if any.
    pub fn check(&mut self, result: Result<(), ValidationError>) {
        if let Err(e) = result {
            self.0.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Field errors in response shape.
    pub fn field_errors(&self) -> Vec<FieldError> {
        self.0
            .iter()
            .map(|e| FieldError {
                field: e.field().to_string(),
                message: e.to_string(),
            })
            .collect()
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        ValidationErrors(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_accessor() {
        let err = ValidationError::OutOfRange {
            field: "quantity".into(),
            min: 1,
            max: 999,
        };
        assert_eq!(err.field(), "quantity");
    }

    #[test]
    fn test_collect_field_errors() {
        let mut errors = ValidationErrors::new();
        errors.check(Ok(()));
        errors.check(Err(ValidationError::required("name")));
        errors.push(ValidationError::invalid("email", "missing @"));

        let fields = errors.field_errors();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field, "name");
        assert_eq!(fields[0].message, "name is required");
        assert_eq!(fields[1].field, "email");
    }

    #[test]
    fn test_empty_collection_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = CoreError::InsufficientStock {
            sku: "LAP-001".into(),
            available: 2,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for LAP-001: available 2, requested 3"
        );
    }
}
