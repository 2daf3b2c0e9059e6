//! The `Provider` contract (§4.1): the abstract boundary every upstream
//! vendor adapter implements. Providers are stateless with respect to
//! queries — health, score and circuit state all live outside the provider
//! instance, in the registry, router and circuit breaker respectively.

pub mod mock;

use crate::error::CoreError;
use crate::models::{DataPoint, DataQuery, DataResponse, ProviderCapability};
use std::collections::HashMap;

/// A named, stateless data source.
///
/// Implementors must be cheap to clone behind an `Arc` and safe to call
/// concurrently from multiple tasks.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Unique identifier used as the registry/router/breaker key.
    fn name(&self) -> &str;

    /// Static, pure capability descriptor.
    fn capability(&self) -> ProviderCapability;

    /// Idempotent authentication check; may be a no-op for providers that
    /// need no credentials. Used as the default health probe (§4.2) when no
    /// dedicated `health_check` is meaningful.
    async fn authenticate(&self) -> Result<bool, CoreError>;

    /// `capability ⊇ query requirements`.
    fn can_handle(&self, query: &DataQuery) -> bool {
        self.capability().accepts(query)
    }

    /// Fetch data for a query. Fails with `CoreError` when capability is
    /// violated or the upstream refuses/errors.
    async fn get_data(&self, query: &DataQuery) -> Result<DataResponse, CoreError>;

    /// Lazy, finite sequence over the same rows `get_data` would return.
    /// The default implementation is exactly equivalent to iterating
    /// `get_data(query).data` (§4.1) — concrete providers with a genuine
    /// streaming transport may override this.
    async fn stream_data(&self, query: &DataQuery) -> Result<Vec<DataPoint>, CoreError> {
        Ok(self.get_data(query).await?.data)
    }

    /// Optional lightweight real-time quote; `Ok(None)` when unsupported.
    async fn realtime_quote(
        &self,
        _symbol: &str,
        _market: &str,
    ) -> Result<Option<HashMap<String, String>>, CoreError> {
        Ok(None)
    }

    /// Dedicated health probe used by the health checker in preference to
    /// `authenticate` when a provider has a cheaper or more representative
    /// check available. Defaults to `authenticate`.
    async fn health_check(&self) -> Result<bool, CoreError> {
        self.authenticate().await
    }
}

/// Configuration shared by concrete provider adapters (not consumed by the
/// `Provider` trait itself, but by the factories that construct them).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: Option<String>,
    #[serde(with = "crate::config::duration_seconds")]
    pub timeout: std::time::Duration,
    pub max_retries: u32,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            timeout: std::time::Duration::from_secs(30),
            max_retries: 3,
            enabled: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_defaults() {
        let cfg = ProviderConfig::new("tushare");
        assert_eq!(cfg.name, "tushare");
        assert_eq!(cfg.max_retries, 3);
        assert!(cfg.enabled);
    }
}
