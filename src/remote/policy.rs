use std::future::Future;
use std::time::Duration;

use crate::configuration::ServiceSettings;
use crate::error::RemoteError;

/// Whether repeating a call is safe from the caller's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Idempotent,
    NonIdempotent,
}

/// Bounded retry with a fixed delay
///
/// Only transient failures of idempotent calls are retried.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    max_retries: u32,
    retry_delay: Duration,
}

impl CallPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::new(settings.max_retries, settings.retry_delay())
    }

    pub async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        kind: CallKind,
        mut attempt: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e)
                    if e.is_transient()
                        && kind == CallKind::Idempotent
                        && retries < self.max_retries =>
                {
                    retries += 1;
                    tracing::warn!(
                        operation,
                        retry = retries,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> CallPolicy {
        CallPolicy::new(1, Duration::from_millis(5))
    }

    async fn failing(calls: &AtomicU32, error: RemoteError) -> Result<u32, RemoteError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(error)
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy()
            .call("test", CallKind::Idempotent, || {
                failing(calls, RemoteError::Transient("timeout".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_attempt_can_succeed() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy()
            .call("test", CallKind::Idempotent, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteError::Transient("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = policy()
            .call("test", CallKind::Idempotent, || {
                failing(calls, RemoteError::Permanent("400".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_call_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _ = policy()
            .call("test", CallKind::NonIdempotent, || {
                failing(calls, RemoteError::Transient("timeout".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
