/// Password Hashing and Verification
///
/// bcrypt produces self-describing modular-crypt strings (`$2b$10$...`)
/// that carry cost and salt, so no salt is stored separately.

use bcrypt::{hash, verify};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

const HASH_COST: u32 = 10;
const MIN_SECRET_LENGTH: usize = 1;
/// bcrypt ignores everything past 72 bytes
const MAX_SECRET_LENGTH: usize = 72;

/// Hash a secret with a fresh random salt
///
/// # Errors
/// Returns error if:
/// - Secret is empty or longer than bcrypt accepts
/// - Bcrypt hashing fails
pub fn hash_password(secret: &str) -> Result<String, AppError> {
    validate_secret(secret)?;

    hash(secret, HASH_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a candidate secret against a stored hash
///
/// The comparison inside bcrypt is constant time. A stored hash that cannot
/// be parsed is an error, never a plain mismatch.
///
/// # Errors
/// Returns error if `stored_hash` is malformed
pub fn verify_password(candidate: &str, stored_hash: &str) -> Result<bool, AppError> {
    verify(candidate, stored_hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

lazy_static! {
    // same cost as real records, so checking against it takes as long
    static ref UNKNOWN_SUBJECT_HASH: String =
        hash("no-such-subject", HASH_COST).unwrap_or_default();
}

/// Spend one bcrypt verification when no record exists
///
/// A failed login then costs the same whether or not the username is known.
/// The outcome is discarded.
pub fn verify_unknown_subject(candidate: &str) {
    let _ = verify(candidate, UNKNOWN_SUBJECT_HASH.as_str());
}

pub fn validate_secret(secret: &str) -> Result<(), ValidationError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ValidationError::EmptyField("secret".to_string()));
    }

    if secret.len() > MAX_SECRET_LENGTH {
        return Err(ValidationError::TooLong(
            "secret".to_string(),
            MAX_SECRET_LENGTH,
        ));
    }

    Ok(())
}
