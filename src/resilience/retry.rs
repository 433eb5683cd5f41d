use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::backoff::RetryConfig;
use super::classify::{RetryClassifier, Retryability};
use crate::Result;

/// Runs an async operation with provider-specific retry classification.
pub struct Retrier<C: RetryClassifier> {
    config: RetryConfig,
    classifier: C,
    provider: String,
}

impl<C: RetryClassifier> Retrier<C> {
    pub fn new(provider: impl Into<String>, config: RetryConfig, classifier: C) -> Self {
        Self {
            config,
            classifier,
            provider: provider.into(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before the next attempt, or `None` to give up.
    ///
    /// - `attempt` is 0-based (first failure => attempt=0).
    /// - Gives up once `attempt >= max_retries`, whatever the classification.
    pub fn decide(&self, attempt: u32, err: &crate::Error) -> Option<Duration> {
        if attempt >= self.config.max_retries {
            return None;
        }
        match self.classifier.classify(err) {
            Retryability::Fatal => None,
            Retryability::Retry {
                reset_hint_secs: Some(secs),
            } => Some(self.config.hinted_delay(secs)),
            Retryability::Retry {
                reset_hint_secs: None,
            } => Some(self.config.jittered_delay(attempt)),
        }
    }

    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with_hook(op, |_| {}).await
    }

    /// Like [`Retrier::run`], calling `on_retry(attempt)` after each backoff
    /// sleep and before the next attempt. The final error is returned unchanged.
    pub async fn run_with_hook<T, F, Fut, H>(&self, mut op: F, mut on_retry: H) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        H: FnMut(u32),
    {
        let mut attempt: u32 = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(delay) = self.decide(attempt, &err) else {
                        return Err(err);
                    };
                    warn!(
                        provider = self.provider.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "ai-kit retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    on_retry(attempt);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind::ErrorKind;
    use crate::resilience::RateLimitClassifier;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let retrier = Retrier::new("replicate", fast(3), RateLimitClassifier);
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let out = retrier
            .run(move |_| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::upstream(429, "throttled"))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_at_ceiling_with_original_error() {
        let retrier = Retrier::new("replicate", fast(2), RateLimitClassifier);
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = retrier
            .run(move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::upstream(429, "still throttled"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.message(), "still throttled");
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let retrier = Retrier::new("replicate", fast(5), RateLimitClassifier);
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = retrier
            .run(move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::upstream(422, "bad input"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_hook_sees_each_retry() {
        let retrier = Retrier::new("gemini", fast(2), RateLimitClassifier);
        let mut seen = Vec::new();
        let _ = retrier
            .run_with_hook(
                |_| async { Err::<(), _>(Error::upstream(429, "x")) },
                |attempt| seen.push(attempt),
            )
            .await;
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_decide_uses_hint_and_ceiling() {
        let retrier = Retrier::new(
            "replicate",
            RetryConfig::new(3, Duration::from_secs(2), Duration::from_secs(30)),
            RateLimitClassifier,
        );
        let hinted = Error::upstream(429, "throttled, resets in ~4s");
        assert_eq!(retrier.decide(0, &hinted), Some(Duration::from_secs(5)));
        assert_eq!(retrier.decide(3, &hinted), None);
    }
}
