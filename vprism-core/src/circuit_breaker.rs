//! Circuit breaker (§4.4): per-provider Closed/Open/Half-Open state machine
//! guarding the resilient executor from hammering a provider that is
//! already failing.
//!
//! Structurally grounded in the teacher's `circuit_breaker.rs` (the same
//! three states, the same `call`/`can_execute`/`on_success`/`on_failure`
//! split). The global, lazily-populated lookup by provider name is grounded
//! in the original implementation's `CircuitBreakerRegistry.get_or_create`.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "crate::config::duration_seconds")]
    pub recovery_timeout: Duration,
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

struct State {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
    half_open_calls: u32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_success_time: None,
            half_open_calls: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

/// One provider's breaker. Cheap to hold behind an `Arc`; all mutation goes
/// through a single `RwLock`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<State>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(State::default()),
        }
    }

    /// Run `operation`, classifying its error via [`CoreError::trips_breaker`]
    /// rather than treating every error alike — a rate-limit or validation
    /// error passes through without affecting breaker state.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        if !self.can_execute().await {
            return Err(CoreError::CircuitOpen {
                name: self.name.clone(),
            });
        }

        match operation().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                if err.trips_breaker() {
                    self.on_failure().await;
                }
                Err(err)
            }
        }
    }

    async fn can_execute(&self) -> bool {
        let mut state = self.state.write().await;
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let Some(last_failure) = state.last_failure_time else {
                    return false;
                };
                if last_failure.elapsed() >= self.config.recovery_timeout {
                    state.state = CircuitState::HalfOpen;
                    state.half_open_calls = 0;
                    state.success_count = 0;
                    tracing::info!(provider = %self.name, "circuit transitioning to half-open");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if state.half_open_calls < self.config.half_open_max_calls {
                    state.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;
        state.success_count += 1;
        state.last_success_time = Some(Instant::now());
        match state.state {
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::HalfOpen => {
                if state.success_count >= self.config.half_open_max_calls {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.half_open_calls = 0;
                    state.success_count = 0;
                    tracing::info!(provider = %self.name, "circuit transitioning to closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
        match state.state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    tracing::warn!(
                        provider = %self.name,
                        failures = state.failure_count,
                        "circuit transitioning to open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.half_open_calls = 0;
                tracing::warn!(provider = %self.name, "circuit reopened after half-open failure");
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }

    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.read().await;
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
        }
    }

    /// Operator escape hatch: force back to closed, clearing counters.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

/// Lazily creates and caches one breaker per provider name, so callers never
/// need to know the full provider set up front.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().await.get(name) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.config.clone())))
            .clone()
    }

    /// Force a named breaker back to closed; no-op if it was never created.
    pub async fn reset(&self, name: &str) {
        if let Some(breaker) = self.breakers.read().await.get(name) {
            breaker.reset().await;
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, recovery: Duration, half_open: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: recovery,
            half_open_max_calls: half_open,
        }
    }

    fn transient() -> CoreError {
        CoreError::ProviderTransient {
            provider: "test".into(),
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn stays_closed_on_success() {
        let breaker = CircuitBreaker::new("test", config(3, Duration::from_secs(1), 2));
        let result = breaker.call(|| async { Ok::<_, CoreError>("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("test", config(2, Duration::from_secs(1), 2));
        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn rejects_without_calling_operation_while_open() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_secs(60), 2));
        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        let called = std::sync::atomic::AtomicBool::new(false);
        let result = breaker
            .call(|| async {
                called.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, CoreError>("ok")
            })
            .await;
        assert!(matches!(result, Err(CoreError::CircuitOpen { .. })));
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn half_open_requires_success_count_to_reach_the_limit() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_millis(50), 2));
        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let result = breaker.call(|| async { Ok::<_, CoreError>("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        let result = breaker.call(|| async { Ok::<_, CoreError>("ok") }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_millis(50), 2));
        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn non_tripping_error_does_not_open_circuit() {
        let breaker = CircuitBreaker::new("test", config(1, Duration::from_secs(60), 2));
        let result = breaker
            .call(|| async {
                Err::<&str, _>(CoreError::RateLimit {
                    provider: "test".into(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn registry_reuses_breaker_per_name() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get_or_create("tushare").await;
        let b = registry.get_or_create("tushare").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn registry_reset_clears_state() {
        let registry = CircuitBreakerRegistry::new(config(1, Duration::from_secs(60), 2));
        let breaker = registry.get_or_create("tushare").await;
        let _ = breaker.call(|| async { Err::<&str, _>(transient()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        registry.reset("tushare").await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
