/// Refresh Token Store
///
/// Maps (subject id, token hash) to the group snapshot taken at issuance
/// and an absolute expiry. `pop_groups` is the one security-critical
/// primitive: it checks and removes in a single atomic step, so of any
/// number of concurrent callers racing on the same key at most one gets
/// the groups back. Expiry is checked on read as well as by the sweep.

mod memory;
mod postgres;
pub mod sweeper;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::InMemoryTokenStore;
pub use postgres::PgTokenStore;

/// One live refresh token, keyed by (subject_id, token_hash)
///
/// Also the body of `PUT /tokens`; the expiry travels as epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenEntry {
    pub subject_id: i64,
    /// SHA-256 of the raw token, never the token itself
    pub token_hash: String,
    #[serde(default)]
    pub groups: BTreeSet<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Register an entry
    ///
    /// Repeating the same put succeeds again; `false` means a different
    /// live entry already holds the key.
    async fn put(&self, entry: &RefreshTokenEntry) -> Result<bool, StoreError>;

    /// Atomically remove a live entry and return its groups
    ///
    /// `None` covers unknown, already popped and expired entries alike.
    async fn pop_groups(
        &self,
        subject_id: i64,
        token_hash: &str,
    ) -> Result<Option<BTreeSet<String>>, StoreError>;

    /// Remove every entry of a subject, returning how many went
    async fn delete_for_subject(&self, subject_id: i64) -> Result<u64, StoreError>;

    /// Remove every expired entry, returning how many went
    async fn sweep_expired(&self) -> Result<u64, StoreError>;
}
