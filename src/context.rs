//! Per-request deadline
//!
//! Every port call made on behalf of one request is bounded by the request's
//! deadline. Expiry surfaces as `LedgerError::Timeout`, which is retriable.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::LedgerError;

/// Deadline and correlation id carried through one request
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    timeout: Duration,
    correlation_id: String,
}

impl RequestContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            timeout,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Run `fut` until the deadline
    pub async fn run<T, F>(&self, fut: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        bounded(self.deadline, self.timeout, fut).await
    }
}

/// Run `fut` with a fresh `timeout`, independent of any request deadline
pub async fn run_with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    bounded(Instant::now() + timeout, timeout, fut).await
}

async fn bounded<T, F>(deadline: Instant, timeout: Duration, fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(1));
        let value = ctx.run(async { Ok::<_, LedgerError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(!ctx.is_expired());
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(10));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, LedgerError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Timeout(_)));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_inner_error_is_kept() {
        let err = run_with_timeout(Duration::from_secs(1), async {
            Err::<(), _>(LedgerError::Storage("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_correlation_id_override() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(1)).with_correlation_id("req-1");
        assert_eq!(ctx.correlation_id(), "req-1");
    }
}
