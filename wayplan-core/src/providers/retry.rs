use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetrySection;

use super::{ProviderError, ProviderResult};

/// Bounded retry with a fixed backoff schedule plus jitter. Only ever used
/// for idempotent read calls (routing, geocoding, weather, search); writes
/// are never retried through this path.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    schedule: Vec<Duration>,
    jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(config: RetrySection) -> Self {
        let mut schedule = config
            .schedule_ms
            .into_iter()
            .map(Duration::from_millis)
            .collect::<Vec<_>>();
        if schedule.is_empty() {
            schedule.push(Duration::from_millis(250));
            schedule.push(Duration::from_millis(1_000));
            schedule.push(Duration::from_millis(4_000));
        }
        Self {
            max_attempts: config.max_attempts.max(1),
            schedule,
            jitter_ms: config.jitter_ms,
        }
    }

    /// Single attempt, no backoff.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            schedule: vec![Duration::from_millis(0)],
            jitter_ms: 0,
        }
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        self.schedule
            .get(attempt.saturating_sub(1))
            .copied()
            .unwrap_or_else(|| *self.schedule.last().unwrap())
    }

    pub async fn run<F, Fut, T>(&self, what: &str, mut operation: F) -> ProviderResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.max_attempts || !retryable(&error) {
                        return Err(error);
                    }
                    let mut delay = self.delay_for_attempt(attempt);
                    if self.jitter_ms > 0 {
                        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
                        delay += Duration::from_millis(jitter);
                    }
                    warn!(
                        target: "providers.retry",
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "upstream call failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

fn retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
        ProviderError::Status(code) => *code >= 500,
        ProviderError::Decode(_) | ProviderError::NoResult(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn quick_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(RetrySection {
            max_attempts,
            schedule_ms: vec![0],
            jitter_ms: 0,
        })
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = quick_policy(3)
            .run("test", |_| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ProviderError::Status(503))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let result: ProviderResult<()> = quick_policy(2)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Status(500)) }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Status(500))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn does_not_retry_malformed_response_bodies() {
        let calls = AtomicUsize::new(0);
        let result: ProviderResult<()> = quick_policy(3)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    let bad = serde_json::from_str::<i64>("not json").unwrap_err();
                    Err(ProviderError::Decode(bad))
                }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn does_not_retry_validation_style_failures() {
        let calls = AtomicUsize::new(0);
        let result: ProviderResult<()> = quick_policy(3)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::NoResult("nowhere".into())) }
            })
            .await;
        assert!(matches!(result, Err(ProviderError::NoResult(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
