/// Input validators
///
/// Usernames are checked here before any store sees them:
/// 1. Length limits (matches the credentials column width)
/// 2. No whitespace and no control characters

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_USERNAME_LENGTH: usize = 254;

lazy_static! {
    // any run of printable, non-whitespace characters
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[^\s\p{Cc}]+$").unwrap();
}

/// Validates a username and returns its trimmed form
pub fn parse_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if trimmed.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "username".to_string(),
            MAX_USERNAME_LENGTH,
        ));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}
