use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RefreshTokenEntry, RefreshTokenStore};
use crate::error::StoreError;

type EntryKey = (i64, String);

struct StoredEntry {
    groups: BTreeSet<String>,
    expires_at: DateTime<Utc>,
}

/// Process-local refresh token store
///
/// Every operation runs under one lock, which makes the check-and-remove
/// in `pop_groups` atomic with respect to `put` and `sweep_expired`.
#[derive(Default)]
pub struct InMemoryTokenStore {
    entries: Mutex<HashMap<EntryKey, StoredEntry>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut HashMap<EntryKey, StoredEntry>) -> T,
    ) -> Result<T, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| {
            tracing::error!(operation, "Token store lock poisoned");
            StoreError::fault(operation, "lock poisoned")
        })?;
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryTokenStore {
    async fn put(&self, entry: &RefreshTokenEntry) -> Result<bool, StoreError> {
        let now = Utc::now();
        self.with_entries("put_token", |entries| {
            let key = (entry.subject_id, entry.token_hash.clone());
            if let Some(existing) = entries.get(&key) {
                if existing.expires_at > now {
                    // a repeated put of the same entry still succeeds
                    return existing.groups == entry.groups
                        && existing.expires_at == entry.expires_at;
                }
            }
            entries.insert(
                key,
                StoredEntry {
                    groups: entry.groups.clone(),
                    expires_at: entry.expires_at,
                },
            );
            true
        })
    }

    async fn pop_groups(
        &self,
        subject_id: i64,
        token_hash: &str,
    ) -> Result<Option<BTreeSet<String>>, StoreError> {
        let now = Utc::now();
        self.with_entries("pop_groups", |entries| {
            entries
                .remove(&(subject_id, token_hash.to_string()))
                .filter(|stored| stored.expires_at > now)
                .map(|stored| stored.groups)
        })
    }

    async fn delete_for_subject(&self, subject_id: i64) -> Result<u64, StoreError> {
        self.with_entries("delete_for_subject", |entries| {
            let before = entries.len();
            entries.retain(|(subject, _), _| *subject != subject_id);
            (before - entries.len()) as u64
        })
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        self.with_entries("sweep_expired", |entries| {
            let before = entries.len();
            entries.retain(|_, stored| stored.expires_at > now);
            (before - entries.len()) as u64
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn entry(subject_id: i64, token_hash: &str, expires_in: Duration) -> RefreshTokenEntry {
        RefreshTokenEntry {
            subject_id,
            token_hash: token_hash.to_string(),
            groups: ["g1".to_string()].into_iter().collect(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_pop_succeeds_exactly_once() {
        let store = InMemoryTokenStore::new();
        assert!(store.put(&entry(42, "hash", Duration::days(1))).await.unwrap());

        let first = store.pop_groups(42, "hash").await.unwrap();
        let second = store.pop_groups(42, "hash").await.unwrap();

        assert_eq!(first, Some(["g1".to_string()].into_iter().collect()));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_pop_requires_matching_subject() {
        let store = InMemoryTokenStore::new();
        store.put(&entry(42, "hash", Duration::days(1))).await.unwrap();

        assert_eq!(store.pop_groups(43, "hash").await.unwrap(), None);
        assert!(store.pop_groups(42, "hash").await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pops_redeem_at_most_once() {
        let store = Arc::new(InMemoryTokenStore::new());
        store.put(&entry(42, "raced", Duration::days(1))).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.pop_groups(42, "raced").await.unwrap() })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_never_popped() {
        let store = InMemoryTokenStore::new();
        store.put(&entry(42, "old", Duration::seconds(-1))).await.unwrap();

        assert_eq!(store.pop_groups(42, "old").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_is_idempotent_but_refuses_a_different_live_entry() {
        let store = InMemoryTokenStore::new();
        let first = entry(1, "h", Duration::days(1));
        assert!(store.put(&first).await.unwrap());
        assert!(store.put(&first).await.unwrap());

        let mut other = first.clone();
        other.groups.insert("ROLE_ADMIN".to_string());
        assert!(!store.put(&other).await.unwrap());
        assert_eq!(store.pop_groups(1, "h").await.unwrap(), Some(first.groups));
    }

    #[tokio::test]
    async fn test_put_replaces_expired_entry() {
        let store = InMemoryTokenStore::new();
        store.put(&entry(1, "h", Duration::seconds(-1))).await.unwrap();
        assert!(store.put(&entry(1, "h", Duration::days(1))).await.unwrap());
        assert!(store.pop_groups(1, "h").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_and_is_idempotent() {
        let store = InMemoryTokenStore::new();
        store.put(&entry(1, "expired-a", Duration::seconds(-10))).await.unwrap();
        store.put(&entry(2, "expired-b", Duration::seconds(-1))).await.unwrap();
        store.put(&entry(1, "live", Duration::days(1))).await.unwrap();

        assert_eq!(store.sweep_expired().await.unwrap(), 2);
        assert_eq!(store.sweep_expired().await.unwrap(), 0);
        assert!(store.pop_groups(1, "live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_for_subject() {
        let store = InMemoryTokenStore::new();
        store.put(&entry(42, "a", Duration::days(1))).await.unwrap();
        store.put(&entry(42, "b", Duration::days(1))).await.unwrap();
        store.put(&entry(7, "c", Duration::days(1))).await.unwrap();

        assert_eq!(store.delete_for_subject(42).await.unwrap(), 2);
        assert_eq!(store.delete_for_subject(42).await.unwrap(), 0);
        assert_eq!(store.pop_groups(42, "a").await.unwrap(), None);
        assert!(store.pop_groups(7, "c").await.unwrap().is_some());
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = RefreshTokenEntry {
            subject_id: 42,
            token_hash: "abc".to_string(),
            groups: BTreeSet::new(),
            expires_at: DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["subjectId"], 42);
        assert_eq!(json["tokenHash"], "abc");
        assert_eq!(json["expiresAt"], 1_893_456_000);
    }
}
