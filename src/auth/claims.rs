/// JWT Claims structure
///
/// Fixed claim set shared by access and refresh tokens. Only the fields
/// below are ever encoded; there is no free-form claim map.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ValidationError};

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Access,
    Refresh,
}

/// Claims carried by every signed token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject (numeric subject id as string)
    pub sub: String,
    /// Issuer
    pub iss: String,
    pub purpose: TokenPurpose,
    /// Authorization groups, access tokens only and only when non-empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeSet<String>>,
    /// Token id, random per token
    pub jti: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl TokenClaims {
    /// Claims for a short-lived access token
    ///
    /// An empty group set is left out entirely.
    pub fn access(
        subject_id: i64,
        groups: &BTreeSet<String>,
        issuer: &str,
        token_id: String,
        issued_at: i64,
        expires_at: i64,
    ) -> Self {
        let groups = if groups.is_empty() {
            None
        } else {
            Some(groups.clone())
        };
        Self {
            sub: subject_id.to_string(),
            iss: issuer.to_string(),
            purpose: TokenPurpose::Access,
            groups,
            jti: token_id,
            exp: expires_at,
            iat: issued_at,
        }
    }

    /// Claims for a refresh token; groups are never embedded so they are
    /// re-resolved from the token store on rotation
    pub fn refresh(
        subject_id: i64,
        issuer: &str,
        token_id: String,
        issued_at: i64,
        expires_at: i64,
    ) -> Self {
        Self {
            sub: subject_id.to_string(),
            iss: issuer.to_string(),
            purpose: TokenPurpose::Refresh,
            groups: None,
            jti: token_id,
            exp: expires_at,
            iat: issued_at,
        }
    }

    /// Extract the numeric subject id
    ///
    /// # Errors
    /// Returns a validation error if the subject is not an integer
    pub fn subject_id(&self) -> Result<i64, AppError> {
        self.sub.parse::<i64>().map_err(|_| {
            AppError::Validation(ValidationError::InvalidFormat("token subject".to_string()))
        })
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups
            .as_ref()
            .map(|groups| groups.contains(group))
            .unwrap_or(false)
    }
}
