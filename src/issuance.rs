/// Token Issuance & Rotation
///
/// Ties the signer to the refresh token store:
/// - `issue` mints an access/refresh pair and registers the refresh token
/// - `rotate` redeems a refresh token exactly once and issues a new pair
///   carrying the group snapshot stored with the redeemed token
/// - `revoke` drops every refresh token of a subject

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::{hash_token, TokenPurpose, TokenSigner};
use crate::error::{AppError, ErrorContext, StoreError};
use crate::token_store::{RefreshTokenEntry, RefreshTokenStore};

/// A freshly minted token pair
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    signer: TokenSigner,
    store: Arc<dyn RefreshTokenStore>,
    degrade_on_store_failure: bool,
}

impl TokenService {
    pub fn new(signer: TokenSigner, store: Arc<dyn RefreshTokenStore>) -> Self {
        Self {
            signer,
            store,
            degrade_on_store_failure: false,
        }
    }

    /// Keep handing out tokens when the refresh token cannot be stored
    ///
    /// Such a refresh token can never be rotated; every occurrence is
    /// logged as an error.
    pub fn degrade_on_store_failure(mut self, degrade: bool) -> Self {
        self.degrade_on_store_failure = degrade;
        self
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// Mint an access/refresh pair and register the refresh token
    ///
    /// # Errors
    /// Fails as a whole when the refresh token cannot be stored, unless
    /// degraded mode is on.
    pub async fn issue(
        &self,
        subject_id: i64,
        groups: BTreeSet<String>,
    ) -> Result<IssuedTokens, AppError> {
        let context = ErrorContext::new("issue_tokens").with_subject_id(subject_id);

        let access = self.signer.issue_access(subject_id, &groups)?;
        let refresh = self.signer.issue_refresh(subject_id)?;

        let entry = RefreshTokenEntry {
            subject_id,
            token_hash: hash_token(&refresh.token),
            groups,
            expires_at: refresh.expires_at,
        };

        let failure = match self.store.put(&entry).await {
            Ok(true) => None,
            Ok(false) => Some(StoreError::fault("put_token", "refresh token was not stored")),
            Err(e) => Some(e),
        };

        if let Some(e) = failure {
            if !self.degrade_on_store_failure {
                return Err(e.into());
            }
            tracing::error!(
                request_id = %context.request_id,
                operation = %context.operation,
                subject_id = context.subject_id,
                error = %e,
                "Refresh token not stored, issuing tokens anyway"
            );
        }

        tracing::debug!(request_id = %context.request_id, subject_id, "Issued token pair");

        Ok(IssuedTokens {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Redeem a refresh token and issue its successor
    ///
    /// `Ok(None)` means the token is unknown, already used or expired and
    /// the client has to authenticate again.
    ///
    /// # Errors
    /// Returns `AuthError::TokenInvalid` for a token that does not verify
    /// as a refresh token, and store faults as they come.
    pub async fn rotate(&self, raw_refresh_token: &str) -> Result<Option<IssuedTokens>, AppError> {
        let claims = self
            .signer
            .verify(raw_refresh_token, TokenPurpose::Refresh)?;
        let subject_id = claims.subject_id()?;

        let token_hash = hash_token(raw_refresh_token);
        match self.store.pop_groups(subject_id, &token_hash).await? {
            Some(groups) => self.issue(subject_id, groups).await.map(Some),
            None => {
                tracing::info!(subject_id, "Refresh token not redeemable");
                Ok(None)
            }
        }
    }

    /// Drop every refresh token of a subject
    pub async fn revoke(&self, subject_id: i64) -> Result<u64, AppError> {
        let deleted = self.store.delete_for_subject(subject_id).await?;
        tracing::debug!(subject_id, deleted, "Revoked refresh tokens");
        Ok(deleted)
    }
}
