use regex::Regex;
use std::sync::OnceLock;

use super::ApiError;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_EMAIL_LEN: usize = 254;
const MAX_TEXT_LEN: usize = 500;

fn username_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("Invalid regex"))
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex")
    })
}

fn role_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_\-]{1,49}$").expect("Invalid regex"))
}

/// Role names are lowercase slugs such as `admin` or `support-staff`.
pub fn validate_role_name(name: &str) -> Result<String, ApiError> {
    let normalized = name.trim().to_lowercase();
    if !role_name_regex().is_match(&normalized) {
        return Err(ApiError::validation(
            "Role name must be 2-50 characters: a letter followed by letters, digits, '-' or '_'",
        ));
    }
    Ok(normalized)
}

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(ApiError::validation(format!(
            "Username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
        )));
    }
    if !username_regex().is_match(trimmed) {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, dots, hyphens, and underscores",
        ));
    }
    Ok(trimmed)
}

pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();
    if trimmed.len() > MAX_EMAIL_LEN || !email_regex().is_match(trimmed) {
        return Err(ApiError::validation(format!("Invalid email address: {trimmed}")));
    }
    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ApiError::validation(format!(
            "Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(password)
}

pub fn validate_required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

pub fn validate_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(ApiError::validation(format!(
            "{field} must be {MAX_TEXT_LEN} characters or less"
        )));
    }
    Ok(())
}

pub fn validate_id(id: i64) -> Result<i64, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}

pub fn validate_ids(field: &str, ids: &[i64]) -> Result<(), ApiError> {
    if let Some(bad) = ids.iter().find(|id| **id <= 0) {
        return Err(ApiError::validation(format!("{field} contains invalid id {bad}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("admin").is_ok());
        assert_eq!(validate_username("  jane.doe ").unwrap(), "jane.doe");
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(51)).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("<script>").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("admin@example.com").is_ok());
        assert!(validate_email("admin@localhost").is_err());
        assert!(validate_email("not an email").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_ids() {
        assert!(validate_id(1).is_ok());
        assert!(validate_id(0).is_err());
        assert!(validate_ids("role_ids", &[1, 2]).is_ok());
        assert!(validate_ids("role_ids", &[1, -2]).is_err());
    }

    #[test]
    fn test_validate_role_name() {
        assert_eq!(validate_role_name(" Editor ").unwrap(), "editor");
        assert!(validate_role_name("support-staff").is_ok());
        assert!(validate_role_name("x").is_err());
        assert!(validate_role_name("1st").is_err());
        assert!(validate_role_name("has space").is_err());
    }

    #[test]
    fn test_validate_required() {
        assert_eq!(validate_required("name", " x ").unwrap(), "x");
        assert!(validate_required("name", "   ").is_err());
    }
}
