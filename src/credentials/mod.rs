/// Credential Store
///
/// Persists (id, username, secret hash, groups) records and enforces
/// username uniqueness. Updates on an unknown id return `Ok(false)` so
/// callers can branch on not-found; a taken username is
/// `StoreError::Conflict`.

mod memory;
mod postgres;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: i64,
    pub username: String,
    pub secret_hash: String,
    pub groups: BTreeSet<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create a record with no groups and return its generated id
    async fn create(&self, username: &str, secret_hash: &str) -> Result<i64, StoreError>;

    async fn find(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError>;

    async fn update_username(&self, id: i64, username: &str) -> Result<bool, StoreError>;

    async fn update_secret(&self, id: i64, secret_hash: &str) -> Result<bool, StoreError>;

    async fn update_groups(&self, id: i64, groups: &BTreeSet<String>) -> Result<bool, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}
