//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Secret names: letters, digits, spaces, dots, dashes and underscores
static SECRET_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 ._-]+$").unwrap());

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LEN: usize = 50;

/// Validate a secret name
pub fn is_valid_secret_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_NAME_LEN).contains(&len) && SECRET_NAME_REGEX.is_match(name)
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

pub fn is_valid_full_name(name: &str) -> bool {
    let len = name.trim().chars().count();
    (1..=MAX_NAME_LEN).contains(&len)
}

/// Check password strength; the error names the first rule broken
pub fn check_password_strength(password: &str, min_length: usize) -> Result<(), String> {
    if password.chars().count() < min_length {
        return Err(format!("Password must be at least {} characters", min_length));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit".to_string());
    }
    Ok(())
}

/// Trim tags and drop empty ones, enforcing count and length limits
pub fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, String> {
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tags.len() > MAX_TAGS {
        return Err(format!("At most {} tags are allowed", MAX_TAGS));
    }
    if let Some(tag) = tags.iter().find(|t| t.chars().count() > MAX_TAG_LEN) {
        return Err(format!("Tag '{}' is longer than {} characters", tag, MAX_TAG_LEN));
    }
    Ok(tags)
}
