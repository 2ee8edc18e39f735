//! # Contact Normalisation
//!
//! Customers are deduplicated on email and phone, and repairs are looked up
//! by them. Both keys are normalised before they are stored or compared:
//!
//! ```text
//! email  " Ravi.K@Example.COM "  ──►  "ravi.k@example.com"
//! phone  "+91 98765-43210"       ──►  "919876543210"
//! ```

/// Lower-cases and trims an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Keeps only ASCII digits.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalises an optional email, mapping blank input to `None`.
pub fn clean_email(email: Option<&str>) -> Option<String> {
    email.map(normalize_email).filter(|e| !e.is_empty())
}

/// Normalises an optional phone, mapping input without digits to `None`.
pub fn clean_phone(phone: Option<&str>) -> Option<String> {
    phone.map(normalize_phone).filter(|p| !p.is_empty())
}

/// Digit-stripped substring match used by repair tracking.
///
/// ```rust
/// use nexus_core::contact::phone_matches;
///
/// assert!(phone_matches("9876543210", "98765-43210"));
/// assert!(phone_matches("919876543210", "98765 43210"));
/// assert!(!phone_matches("9876543210", "12345"));
/// ```
pub fn phone_matches(stored: &str, query: &str) -> bool {
    let needle = normalize_phone(query);
    if needle.is_empty() {
        return false;
    }
    normalize_phone(stored).contains(&needle)
}

/// Case-folded exact email match.
pub fn email_matches(stored: &str, query: &str) -> bool {
    let query = normalize_email(query);
    !query.is_empty() && normalize_email(stored) == query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+91 (987) 654-3210"), "919876543210");
        assert_eq!(normalize_phone("n/a"), "");
    }

    #[test]
    fn test_clean_helpers() {
        assert_eq!(clean_email(Some("  ")), None);
        assert_eq!(clean_email(Some(" A@B.in ")).as_deref(), Some("a@b.in"));
        assert_eq!(clean_phone(Some("--")), None);
        assert_eq!(clean_phone(None), None);
    }

    #[test]
    fn test_email_matches_case_folded() {
        assert!(email_matches("ravi@example.com", "RAVI@Example.com "));
        assert!(!email_matches("ravi@example.com", "ravi@example.org"));
        assert!(!email_matches("ravi@example.com", ""));
    }

    #[test]
    fn test_empty_phone_query_never_matches() {
        assert!(!phone_matches("9876543210", "abc"));
    }
}
