//! Timeout + bounded retry around every store call.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{error, warn};

use crate::error::{GraphError, GraphResult};
use crate::types::config::RetryConfig;

/// Shared retry policy: each attempt is bounded by `timeout`, transient
/// failures back off exponentially up to `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    timeout: Duration,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.config.base_delay_ms;
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(base.saturating_mul(factor).min(self.config.max_delay_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> GraphResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GraphResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(GraphError::Timeout {
                    operation: operation.to_string(),
                    after: self.timeout,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts() => {
                    let delay = self.delay(attempt);
                    warn!(
                        error = %e,
                        operation,
                        retry = attempt,
                        max_attempts = self.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Store call failed, retrying..."
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(error = %e, operation, attempts = attempt, "Store call failed after all retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_backs_off_and_caps() {
        let policy = RetryPolicy::new(
            RetryConfig::new(5)
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(350)),
            Duration::from_secs(1),
        );
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(350));
        assert_eq!(policy.delay(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::new(RetryConfig::immediate(3), Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = policy
            .run("ping", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GraphError::Unavailable("down".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(RetryConfig::immediate(2), Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: GraphResult<()> = policy
            .run("upsert_node", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GraphError::Unavailable("down".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::new(RetryConfig::immediate(5), Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: GraphResult<()> = policy
            .run("upsert_edge", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GraphError::MissingEndpoint { id: "unit:x".into() })
            })
            .await;
        assert!(matches!(result, Err(GraphError::MissingEndpoint { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decode_errors_are_not_retried() {
        let policy = RetryPolicy::new(RetryConfig::immediate(5), Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: GraphResult<()> = policy
            .run("find_nodes", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GraphError::decode("unknown node kind \"Widget\""))
            })
            .await;
        assert!(matches!(result, Err(GraphError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let policy = RetryPolicy::new(RetryConfig::immediate(1), Duration::from_millis(10));
        let result: GraphResult<()> = policy
            .run("ping", || async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(GraphError::Timeout { .. })));
    }
}
