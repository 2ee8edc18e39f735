//! # Validation Module
//!
//! Input validation utilities for Nexus CRM.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: SPA form checks (immediate feedback)                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: REST handler (Rust)                                          │
//! │  ├── Type validation (serde deserialization)                           │
//! │  └── THIS MODULE: field rules, collected into ValidationErrors         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE indexes (→ 409)                                            │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators return a single [`ValidationError`]; handlers feed them into
//! a [`crate::ValidationErrors`] so the response lists every bad field.

use crate::contact::normalize_phone;
use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Checks that a trimmed value is non-empty and at most `max` characters.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Checks an optional free-text field only for length.
pub fn validate_optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

/// Validates a person's name (customer or staff).
pub fn validate_person_name(field: &str, name: &str) -> ValidationResult<()> {
    validate_text(field, name, 120)
}

/// Validates a product name.
///
/// ## Example
/// ```rust
/// use nexus_core::validation::validate_product_name;
///
/// assert!(validate_product_name("ThinkPad X1 Carbon Gen 11").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Validates an email address.
///
/// ## Rules
/// - exactly one `@`, non-empty local part
/// - domain contains a dot that is neither first nor last
/// - no whitespace, at most 254 characters
pub fn validate_email(field: &str, email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(ValidationError::required(field));
    }

    if email.len() > 254 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 254,
        });
    }

    let invalid = || ValidationError::invalid(field, "must be a valid email address");

    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(l), Some(d), None) => (l, d),
        _ => return Err(invalid()),
    };

    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(invalid());
    }

    Ok(())
}

/// Validates a phone number: 7 to 15 digits once punctuation is stripped.
pub fn validate_phone(field: &str, phone: &str) -> ValidationResult<()> {
    let digits = normalize_phone(phone);

    if digits.is_empty() {
        return Err(ValidationError::required(field));
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(ValidationError::invalid(field, "must contain 7 to 15 digits"));
    }

    Ok(())
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::required("sku"));
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid(
            "sku",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a store code: 2 to 10 letters or digits.
pub fn validate_store_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("code"));
    }

    if code.len() < 2 {
        return Err(ValidationError::TooShort {
            field: "code".to_string(),
            min: 2,
        });
    }

    if code.len() > 10 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 10,
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid("code", "must be alphanumeric"));
    }

    Ok(())
}

/// Validates a password for a new account.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::required("password"));
    }

    if password.chars().count() < 8 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 8,
        });
    }

    if password.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: 128,
        });
    }

    Ok(())
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }

    uuid::Uuid::parse_str(value.trim())
        .map(|_| ())
        .map_err(|_| ValidationError::invalid(field, "must be a valid UUID"))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be at least 1
/// - Must not exceed [`MAX_ITEM_QUANTITY`]
///
/// ## Example
/// ```rust
/// use nexus_core::validation::validate_quantity;
///
/// assert!(validate_quantity("quantity", 2).is_ok());
/// assert!(validate_quantity("quantity", 0).is_err());
/// assert!(validate_quantity("quantity", 10_000).is_err());
/// ```
pub fn validate_quantity(field: &str, quantity: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock count (zero allowed).
pub fn validate_stock_count(field: &str, count: i64) -> ValidationResult<()> {
    if !(0..=1_000_000).contains(&count) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 1_000_000,
        });
    }

    Ok(())
}

/// Validates a monetary amount that may be zero (prices, costs, discounts).
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    // ₹1 crore
    const MAX_PRICE_CENTS: i64 = 1_000_000_000;

    if !(0..=MAX_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a monetary amount that must be strictly positive (refunds).
pub fn validate_positive_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0 - 10000 = 0% - 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate_bps".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("email", "ravi@example.com").is_ok());
        assert!(validate_email("email", " Ravi@Example.co.in ").is_ok());
        assert!(validate_email("email", "").is_err());
        assert!(validate_email("email", "ravi.example.com").is_err());
        assert!(validate_email("email", "ravi@localhost").is_err());
        assert!(validate_email("email", "a@b@c.com").is_err());
        assert!(validate_email("email", "ra vi@example.com").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("phone", "98765-43210").is_ok());
        assert!(validate_phone("phone", "+91 98765 43210").is_ok());
        assert!(validate_phone("phone", "12345").is_err());
        assert!(validate_phone("phone", "").is_err());
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("LAP-DELL-XPS13").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_store_code() {
        assert!(validate_store_code("BLR01").is_ok());
        assert!(validate_store_code("B").is_err());
        assert!(validate_store_code("BLR-01").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("correct horse").is_ok());
        assert!(matches!(
            validate_password("short"),
            Err(ValidationError::TooShort { min: 8, .. })
        ));
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_price_cents("price_cents", 0).is_ok());
        assert!(validate_price_cents("price_cents", -1).is_err());
        assert!(validate_positive_cents("amount_cents", 0).is_err());
        assert!(validate_positive_cents("amount_cents", 1).is_ok());
        assert!(validate_tax_rate_bps(1800).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }

    #[test]
    fn test_validate_optional_text() {
        assert!(validate_optional_text("notes", None, 10).is_ok());
        assert!(validate_optional_text("notes", Some("short"), 10).is_ok());
        assert!(validate_optional_text("notes", Some("far too long text"), 10).is_err());
    }
}
