use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::policy::{CallKind, CallPolicy};
use crate::error::{AppError, RemoteError, StoreError};
use crate::token_store::{RefreshTokenEntry, RefreshTokenStore};

/// Refresh token store owned by another instance, reached over `/tokens`
#[derive(Clone)]
pub struct HttpTokenStore {
    http_client: reqwest::Client,
    base_url: String,
    policy: CallPolicy,
}

impl HttpTokenStore {
    pub fn new(base_url: String, timeout: Duration, policy: CallPolicy) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        request.send().await.map_err(|e| {
            if e.is_builder() {
                RemoteError::Permanent(e.to_string())
            } else {
                RemoteError::Transient(e.to_string())
            }
        })
    }

    async fn read_count(response: reqwest::Response) -> Result<u64, RemoteError> {
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        body.trim()
            .parse::<u64>()
            .map_err(|_| RemoteError::Permanent(format!("unexpected count body {:?}", body)))
    }
}

fn unexpected_status(status: StatusCode) -> RemoteError {
    if status.is_server_error() {
        RemoteError::Transient(format!("token store answered {}", status))
    } else {
        RemoteError::Permanent(format!("token store answered {}", status))
    }
}

/// Log the final failure of a remote call and fold it into the store taxonomy
fn store_fault(operation: &'static str, subject_id: Option<i64>, err: RemoteError) -> StoreError {
    tracing::error!(operation, subject_id = ?subject_id, error = %err, "Remote token store call failed");
    StoreError::from(err)
}

#[async_trait]
impl RefreshTokenStore for HttpTokenStore {
    async fn put(&self, entry: &RefreshTokenEntry) -> Result<bool, StoreError> {
        let url = format!("{}/tokens", self.base_url);
        let url = url.as_str();
        self.policy
            .call("put_token", CallKind::Idempotent, || async move {
                let response = self.send(self.http_client.put(url).json(entry)).await?;
                match response.status() {
                    s if s.is_success() => Ok(true),
                    StatusCode::CONFLICT => Ok(false),
                    s => Err(unexpected_status(s)),
                }
            })
            .await
            .map_err(|e| store_fault("put_token", Some(entry.subject_id), e))
    }

    async fn pop_groups(
        &self,
        subject_id: i64,
        token_hash: &str,
    ) -> Result<Option<BTreeSet<String>>, StoreError> {
        let url = format!("{}/tokens/{}", self.base_url, subject_id);
        let url = url.as_str();
        self.policy
            .call("pop_groups", CallKind::Idempotent, || async move {
                let request = self
                    .http_client
                    .get(url)
                    .query(&[("token-hash", token_hash)]);
                let response = self.send(request).await?;
                match response.status() {
                    StatusCode::OK => response
                        .json::<BTreeSet<String>>()
                        .await
                        .map(Some)
                        .map_err(|e| RemoteError::Permanent(e.to_string())),
                    StatusCode::NOT_FOUND => Ok(None),
                    s => Err(unexpected_status(s)),
                }
            })
            .await
            .map_err(|e| store_fault("pop_groups", Some(subject_id), e))
    }

    async fn delete_for_subject(&self, subject_id: i64) -> Result<u64, StoreError> {
        let url = format!("{}/tokens/{}", self.base_url, subject_id);
        let url = url.as_str();
        self.policy
            .call("delete_for_subject", CallKind::Idempotent, || async move {
                let response = self.send(self.http_client.delete(url)).await?;
                match response.status() {
                    StatusCode::OK => Self::read_count(response).await,
                    s => Err(unexpected_status(s)),
                }
            })
            .await
            .map_err(|e| store_fault("delete_for_subject", Some(subject_id), e))
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let url = format!("{}/tokens/expired", self.base_url);
        let url = url.as_str();
        self.policy
            .call("sweep_expired", CallKind::Idempotent, || async move {
                let response = self.send(self.http_client.delete(url)).await?;
                match response.status() {
                    StatusCode::OK => Self::read_count(response).await,
                    s => Err(unexpected_status(s)),
                }
            })
            .await
            .map_err(|e| store_fault("sweep_expired", None, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_store_is_a_fault_after_one_retry() {
        // nothing listens on port 9 of the loopback interface
        let store = HttpTokenStore::new(
            "http://127.0.0.1:9/".to_string(),
            Duration::from_millis(500),
            CallPolicy::new(1, Duration::from_millis(5)),
        )
        .unwrap();

        let result = store.delete_for_subject(42).await;
        assert!(matches!(result, Err(StoreError::Fault { .. })));
    }

    #[test]
    fn test_status_classification() {
        assert!(unexpected_status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(!unexpected_status(StatusCode::BAD_REQUEST).is_transient());
    }
}
