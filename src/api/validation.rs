//! Input validation for API requests.
//!
//! Each `validate_*` function returns `Err(message)` for a single field.
//! Handlers collect them with `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email check: one `@`, a dot in the domain, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s]+@[^@\s]+\.[^@\s]+$"
    ).unwrap();

    /// Lowercase words joined by single dashes
    static ref SLUG_REGEX: Regex = Regex::new(
        r"^[a-z0-9]+(-[a-z0-9]+)*$"
    ).unwrap();

    /// Digits with optional leading `+` and spaces, dashes or parentheses
    static ref PHONE_REGEX: Regex = Regex::new(
        r"^\+?[0-9 ()\-]+$"
    ).unwrap();

    static ref HTTP_URL_REGEX: Regex = Regex::new(
        r"^https?://[^\s/$.?#][^\s]*$"
    ).unwrap();

    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Trimmed, lowercased email used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        ));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX_LEN
        ));
    }
    Ok(())
}

/// Character-count bounds on a trimmed value.
pub fn validate_length(value: &str, label: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.trim().chars().count();
    if min > 0 && len == 0 {
        return Err(format!("{} is required", label));
    }
    if len < min {
        return Err(format!("{} must be at least {} characters", label, min));
    }
    if len > max {
        return Err(format!("{} must be at most {} characters", label, max));
    }
    Ok(())
}

/// Like `validate_length`, but absent values pass.
pub fn validate_optional_length(
    value: &Option<String>,
    label: &str,
    min: usize,
    max: usize,
) -> Result<(), String> {
    match value {
        Some(v) => validate_length(v, label, min, max),
        None => Ok(()),
    }
}

pub fn validate_phone(phone: &Option<String>, min: usize, max: usize) -> Result<(), String> {
    let Some(phone) = phone else {
        return Ok(());
    };
    validate_length(phone, "Phone", min, max)?;
    if !PHONE_REGEX.is_match(phone.trim()) {
        return Err("Phone may only contain digits, spaces, +, - and parentheses".to_string());
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("Slug is required".to_string());
    }
    if slug.len() > 120 {
        return Err("Slug is too long (max 120 characters)".to_string());
    }
    if !SLUG_REGEX.is_match(slug) {
        return Err(
            "Slug must be lowercase letters and digits separated by single dashes".to_string(),
        );
    }
    Ok(())
}

pub fn validate_http_url(url: &Option<String>) -> Result<(), String> {
    match url {
        Some(url) if url.len() > 2048 => Err("URL is too long (max 2048 characters)".to_string()),
        Some(url) if !HTTP_URL_REGEX.is_match(url) => {
            Err("URL must start with http:// or https://".to_string())
        }
        _ => Ok(()),
    }
}

/// Calendar date in `YYYY-MM-DD` form.
pub fn validate_date(date: &Option<String>) -> Result<(), String> {
    match date {
        Some(d) if chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err() => {
            Err("Date must be formatted as YYYY-MM-DD".to_string())
        }
        _ => Ok(()),
    }
}

pub fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price < 0.0 {
        return Err("Price must be a non-negative number".to_string());
    }
    Ok(())
}

pub fn validate_stock(quantity: i64) -> Result<(), String> {
    if quantity < 0 {
        return Err("Quantity cannot be negative".to_string());
    }
    Ok(())
}

pub fn validate_amount(amount: Option<f64>, label: &str) -> Result<(), String> {
    match amount {
        Some(a) if !a.is_finite() || a < 0.0 => Err(format!("{} must be zero or more", label)),
        _ => Ok(()),
    }
}

/// Validate that a string is a valid UUID
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }
    Ok(())
}

/// Default slug for a name: lowercased, whitespace runs become `-`.
pub fn slugify(name: &str) -> String {
    WHITESPACE_REGEX
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("jane.doe+shop@mail.example.co").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("jane").is_err());
        assert!(validate_email("jane@example").is_err());
        assert!(validate_email("ja ne@example.com").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Jane@Example.COM "), "jane@example.com");
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("hunter22").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("Main St 1", "Line 1", 3, 200).is_ok());
        assert!(validate_length("ab", "Line 1", 3, 200).is_err());
        assert!(validate_length("   ", "City", 2, 100)
            .unwrap_err()
            .contains("required"));
        assert!(validate_length(&"a".repeat(101), "Name", 1, 100).is_err());
        assert!(validate_optional_length(&None, "Line 2", 0, 200).is_ok());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone(&Some("+1 (555) 010-9999".to_string()), 7, 20).is_ok());
        assert!(validate_phone(&Some("12345".to_string()), 7, 20).is_err());
        assert!(validate_phone(&Some("call me maybe".to_string()), 7, 20).is_err());
        assert!(validate_phone(&None, 7, 20).is_ok());
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("classic-shirt").is_ok());
        assert!(validate_slug("shirts").is_ok());
        assert!(validate_slug("Classic Shirt").is_err());
        assert!(validate_slug("double--dash").is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Summer  Dresses"), "summer-dresses");
        assert_eq!(slugify(" Men "), "men");
    }

    #[test]
    fn test_validate_date_and_url() {
        assert!(validate_date(&Some("1990-04-30".to_string())).is_ok());
        assert!(validate_date(&Some("1990-02-30".to_string())).is_err());
        assert!(validate_date(&Some("30/04/1990".to_string())).is_err());
        assert!(validate_http_url(&Some("https://cdn.example.com/a.png".to_string())).is_ok());
        assert!(validate_http_url(&Some("ftp://example.com/a.png".to_string())).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_price(25.99).is_ok());
        assert!(validate_price(-1.0).is_err());
        assert!(validate_price(f64::NAN).is_err());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-3).is_err());
        assert!(validate_amount(None, "Discount").is_ok());
        assert!(validate_amount(Some(-0.5), "Discount").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "address id").is_ok());
        assert!(validate_uuid("not-a-uuid", "address id").is_err());
    }
}
