/// JWT Token Generation and Validation
///
/// `TokenSigner` shapes access and refresh claim sets and signs them with
/// the key loaded from configuration at startup.

use std::collections::BTreeSet;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;

use crate::auth::claims::{TokenClaims, TokenPurpose};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// 128 bits of entropy per token id
const TOKEN_ID_BYTES: usize = 16;

/// A signed, self-contained token and its absolute expiry
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

impl TokenSigner {
    /// # Errors
    /// Returns a configuration error when the signing secret is empty
    pub fn new(config: &JwtSettings) -> Result<Self, AppError> {
        if config.secret.trim().is_empty() {
            return Err(AppError::Config("jwt.secret must not be empty".to_string()));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_token_expiry: config.access_token_expiry,
            refresh_token_expiry: config.refresh_token_expiry,
        })
    }

    pub fn refresh_token_expiry(&self) -> i64 {
        self.refresh_token_expiry
    }

    /// Sign a new access token carrying the subject's groups
    pub fn issue_access(
        &self,
        subject_id: i64,
        groups: &BTreeSet<String>,
    ) -> Result<SignedToken, AppError> {
        let now = Utc::now().timestamp();
        let expires_at = now + self.access_token_expiry;
        let claims =
            TokenClaims::access(subject_id, groups, &self.issuer, random_token_id(), now, expires_at);
        self.sign(&claims)
    }

    /// Sign a new refresh token
    pub fn issue_refresh(&self, subject_id: i64) -> Result<SignedToken, AppError> {
        let now = Utc::now().timestamp();
        let expires_at = now + self.refresh_token_expiry;
        let claims =
            TokenClaims::refresh(subject_id, &self.issuer, random_token_id(), now, expires_at);
        self.sign(&claims)
    }

    /// Validate a token and check it was minted for `purpose`
    ///
    /// # Errors
    /// Returns `AuthError::TokenInvalid` if the token is malformed, tampered
    /// with, expired, from another issuer or of the wrong purpose
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<TokenClaims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT validation error: {}", e);
                AppError::Auth(AuthError::TokenInvalid)
            })?;

        if claims.purpose != purpose {
            tracing::debug!(expected = ?purpose, actual = ?claims.purpose, "Token purpose mismatch");
            return Err(AppError::Auth(AuthError::TokenInvalid));
        }
        Ok(claims)
    }

    fn sign(&self, claims: &TokenClaims) -> Result<SignedToken, AppError> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;
        Ok(SignedToken { token, expires_at })
    }
}

/// Random URL-safe token id
fn random_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
