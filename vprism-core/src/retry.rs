//! Retry engine (§4.5): bounded exponential backoff with optional jitter,
//! classifying errors via [`CoreError::is_retryable`]/[`CoreError::is_skip`]
//! instead of retrying everything indiscriminately.
//!
//! The builder/injectable-sleeper shape is grounded in the pack's resilience
//! crate (`flyingrobots-ninelives`'s `RetryPolicy`/`Sleeper`); the delay
//! formula itself — `baseDelay * exponentialBase^attempt`, capped at
//! `maxDelay`, ±10% jitter — is the specification's own.

use crate::error::CoreError;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

pub struct RetryEngine {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryEngine {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.config.exponential_base.powi(attempt as i32);
        let millis = (self.config.base_delay.as_millis() as f64 * exp)
            .min(self.config.max_delay.as_millis() as f64);
        let millis = if self.config.jitter {
            let jitter_fraction = rand::thread_rng().gen_range(-0.1..=0.1);
            (millis * (1.0 + jitter_fraction)).max(0.0)
        } else {
            millis
        };
        Duration::from_millis(millis.round() as u64)
    }

    /// Run `operation` up to `max_attempts` times. A `CoreError::is_skip`
    /// error returns immediately without consuming further attempts or
    /// sleeping; a non-retryable error also returns immediately; a
    /// retryable error sleeps with backoff before the next attempt, unless
    /// this was the last one.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        for attempt in 0..self.config.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_skip() => return Err(err),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt + 1 >= self.config.max_attempts {
                        return Err(err);
                    }
                    self.sleeper.sleep(self.delay_for(attempt)).await;
                }
            }
        }
        unreachable!("loop always returns on the final attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct InstantSleeper {
        calls: Mutex<Vec<Duration>>,
    }

    impl InstantSleeper {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, duration: Duration) {
            self.calls.lock().unwrap().push(duration);
        }
    }

    fn transient() -> CoreError {
        CoreError::ProviderTransient {
            provider: "test".into(),
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_attempt() {
        let engine = RetryEngine::new(RetryConfig::default()).with_sleeper(InstantSleeper::new());
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CoreError>(42)
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_exactly_max_attempts_on_persistent_failure() {
        let config = RetryConfig {
            max_attempts: 3,
            jitter: false,
            ..Default::default()
        };
        let engine = RetryEngine::new(config).with_sleeper(InstantSleeper::new());
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(transient())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn skip_error_returns_immediately_without_retry() {
        let engine = RetryEngine::new(RetryConfig::default()).with_sleeper(InstantSleeper::new());
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CoreError::RateLimit {
                    provider: "test".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        let engine = RetryEngine::new(RetryConfig::default()).with_sleeper(InstantSleeper::new());
        let calls = AtomicU32::new(0);
        let result = engine
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(CoreError::ProviderFatal {
                    provider: "test".into(),
                    message: "bad credentials".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_delay_is_capped_at_max_delay() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: false,
            ..Default::default()
        };
        let engine = RetryEngine::new(config);
        assert_eq!(engine.delay_for(0), Duration::from_secs(1));
        assert_eq!(engine.delay_for(1), Duration::from_secs(2));
        assert_eq!(engine.delay_for(5), Duration::from_secs(10));
    }
}
