//! Error taxonomy for the market-data access layer.
//!
//! The taxonomy is a single sealed enum rather than an inheritance hierarchy
//! of exception classes: retry and circuit-breaker policy match on
//! `CoreError` variants directly, so classification is exhaustive and
//! compiler-checked instead of relying on catch-ordering.

use thiserror::Error;

/// Errors surfaced by any component of the core (router, cache, repository,
/// batch processor, ingestion pipeline).
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// The query does not fit any registered provider's capability.
    #[error("query does not match any provider capability: {message}")]
    CapabilityViolation { message: String },

    /// No healthy, capable provider exists for this query.
    #[error("no healthy capable provider for query")]
    NoCapableProvider,

    /// Upstream provider declared a rate limit. Never retried.
    #[error("rate limited by provider {provider}")]
    RateLimit { provider: String },

    /// Connection failure, timeout, or 5xx-equivalent. Retried and counted
    /// by the circuit breaker.
    #[error("transient provider error ({provider}): {message}")]
    ProviderTransient { provider: String, message: String },

    /// 4xx-equivalent or malformed payload. Not retried, still counted by
    /// the circuit breaker.
    #[error("fatal provider error ({provider}): {message}")]
    ProviderFatal { provider: String, message: String },

    /// The circuit for this provider is open; the call was rejected without
    /// ever being attempted.
    #[error("circuit open for {name}")]
    CircuitOpen { name: String },

    /// Raw-row validation failed; batch rejected with one or more issues.
    #[error("validation failed with {count} issue(s)")]
    Validation { count: usize },

    /// The call's deadline elapsed.
    #[error("deadline exceeded")]
    Timeout,

    /// An internal cache or repository I/O fault. Non-fatal to the caller —
    /// callers downgrade this to a `warnings` entry rather than failing the
    /// response.
    #[error("cache/storage error: {message}")]
    Storage { message: String },

    /// Invariant violation. Must never be silently downgraded to success.
    #[error("internal invariant violated: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Whether the retry engine's default `retryOn` set matches this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ProviderTransient { .. } | CoreError::Timeout
        )
    }

    /// Whether the retry engine's default `skipOn` set matches this error —
    /// propagate immediately without consuming further attempts.
    pub fn is_skip(&self) -> bool {
        matches!(self, CoreError::RateLimit { .. })
    }

    /// Whether the circuit breaker should count this outcome as a failure.
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            CoreError::ProviderTransient { .. }
                | CoreError::ProviderFatal { .. }
                | CoreError::Timeout
        )
    }
}

/// Convenience alias used throughout the core.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
