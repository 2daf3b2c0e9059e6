//! Resilient executor: the breaker wraps the retry loop, not the other way
//! round, so a rejection while the circuit is open never consumes one of
//! the caller's retry attempts (§9 composition decision, §4.4/§4.5).
//!
//! Grounded in the teacher's `circuit_breaker_provider.rs` wrapper pattern —
//! the shape of composing a breaker around a fallible call survives even
//! though the teacher wrapped a chat-completion provider and this wraps a
//! market-data provider.

use crate::circuit_breaker::CircuitBreaker;
use crate::error::CoreError;
use crate::retry::RetryEngine;
use std::future::Future;
use std::sync::Arc;

pub struct ResilientExecutor {
    breaker: Arc<CircuitBreaker>,
    retry: RetryEngine,
}

impl ResilientExecutor {
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryEngine) -> Self {
        Self { breaker, retry }
    }

    /// `breaker.call(|| retry.execute(|| operation()))`: the breaker decides
    /// once whether to let the whole retry sequence through at all; each
    /// retry attempt inside only affects the breaker's failure count when
    /// the final attempt's error is reported back up.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let retry = &self.retry;
        self.breaker
            .call(|| async move { retry.execute(&mut operation).await })
            .await
    }
}
