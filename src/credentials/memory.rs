use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{CredentialRecord, CredentialStore};
use crate::error::StoreError;

#[derive(Default)]
struct Records {
    next_id: i64,
    by_id: HashMap<i64, CredentialRecord>,
}

impl Records {
    fn username_taken(&self, username: &str, except_id: Option<i64>) -> bool {
        self.by_id
            .values()
            .any(|r| r.username == username && Some(r.id) != except_id)
    }
}

/// Process-local credential store, used by the `memory` backend and tests
#[derive(Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<Records>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Records) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut records = self.records.lock().map_err(|_| {
            tracing::error!(operation, "Credential store lock poisoned");
            StoreError::fault(operation, "lock poisoned")
        })?;
        f(&mut records)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create(&self, username: &str, secret_hash: &str) -> Result<i64, StoreError> {
        self.with_records("create_credentials", |records| {
            if records.username_taken(username, None) {
                return Err(StoreError::Conflict);
            }
            records.next_id += 1;
            let id = records.next_id;
            records.by_id.insert(
                id,
                CredentialRecord {
                    id,
                    username: username.to_string(),
                    secret_hash: secret_hash.to_string(),
                    groups: BTreeSet::new(),
                },
            );
            Ok(id)
        })
    }

    async fn find(&self, username: &str) -> Result<Option<CredentialRecord>, StoreError> {
        self.with_records("find_credentials", |records| {
            Ok(records
                .by_id
                .values()
                .find(|r| r.username == username)
                .cloned())
        })
    }

    async fn update_username(&self, id: i64, username: &str) -> Result<bool, StoreError> {
        self.with_records("update_username", |records| {
            if !records.by_id.contains_key(&id) {
                return Ok(false);
            }
            if records.username_taken(username, Some(id)) {
                return Err(StoreError::Conflict);
            }
            if let Some(record) = records.by_id.get_mut(&id) {
                record.username = username.to_string();
            }
            Ok(true)
        })
    }

    async fn update_secret(&self, id: i64, secret_hash: &str) -> Result<bool, StoreError> {
        self.with_records("update_secret", |records| {
            Ok(match records.by_id.get_mut(&id) {
                Some(record) => {
                    record.secret_hash = secret_hash.to_string();
                    true
                }
                None => false,
            })
        })
    }

    async fn update_groups(&self, id: i64, groups: &BTreeSet<String>) -> Result<bool, StoreError> {
        self.with_records("update_groups", |records| {
            Ok(match records.by_id.get_mut(&id) {
                Some(record) => {
                    record.groups = groups.clone();
                    true
                }
                None => false,
            })
        })
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.with_records("delete_credentials", |records| {
            Ok(records.by_id.remove(&id).is_some())
        })
    }
}
