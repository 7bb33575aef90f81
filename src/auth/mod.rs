/// Authentication module
///
/// Token signing and validation, password hashing, refresh token hashing
/// and the authorization guard.

mod claims;
mod guard;
mod jwt;
mod password;
mod refresh_token;

pub use claims::TokenClaims;
pub use claims::TokenPurpose;
pub use guard::{can_mutate, can_mutate_admin_only, ROLE_ADMIN};
pub use jwt::{SignedToken, TokenSigner};
pub use password::{hash_password, validate_secret, verify_password, verify_unknown_subject};
pub use refresh_token::hash_token;
