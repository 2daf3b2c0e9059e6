//! # Client Module
//!
//! The caller-facing surface of the market-data access layer: `get`,
//! `execute`, `stream`, and `batch` (§6), plus an optional fluent query
//! builder. Everything here is composition — provider selection, resilient
//! execution, cache lookups and batch fan-out are delegated to the router,
//! executor, cache and batch processor respectively; this module owns none
//! of that logic itself.
//!
//! Structurally grounded in the teacher's `client.rs` (a struct wrapping
//! provider/router/cache state with a builder for assembly), generalized
//! from a single-request-shape LLM client to the four-operation market-data
//! surface this layer exposes.

use crate::batch::{BatchConfig, BatchProcessor, BatchResult};
use crate::cache::TwoTierCache;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::executor::ResilientExecutor;
use crate::models::{AssetKind, DataPoint, DataQuery, DataResponse, Market, Timeframe};
use crate::providers::Provider;
use crate::registry::ProviderRegistry;
use crate::repository::Repository;
use crate::router::Router;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// The assembled market-data client. Cheap to clone (everything inside is
/// an `Arc`), safe to share across tasks.
#[derive(Clone)]
pub struct Client {
    registry: Arc<ProviderRegistry>,
    router: Arc<Router>,
    cache: Option<Arc<TwoTierCache>>,
    repository: Option<Arc<Repository>>,
    batch: Arc<BatchProcessor>,
    breakers: Arc<crate::circuit_breaker::CircuitBreakerRegistry>,
    config: Arc<CoreConfig>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Synchronous-style call (§6): cache-first, falling through to the
    /// resilient executor against the router's chosen provider. A cache hit
    /// short-circuits provider selection entirely.
    pub async fn get(&self, query: &DataQuery) -> Result<DataResponse, CoreError> {
        self.execute(query).await
    }

    /// Async/deadline variant (§6). Identical semantics to `get` — the
    /// distinction exists at the caller-facing boundary (sync wrapper vs.
    /// native async), not in this core, which is async throughout.
    pub async fn execute(&self, query: &DataQuery) -> Result<DataResponse, CoreError> {
        let start = Instant::now();

        if let Some(cache) = &self.cache {
            match cache.get(query).await {
                Ok(Some(mut hit)) => {
                    hit.metadata.cache_hit = true;
                    return Ok(hit);
                }
                Ok(None) => {}
                // Cache/Storage faults downgrade to a warning; the provider
                // path is still attempted (fail-open, §7).
                Err(err) => tracing::warn!("cache read failed, falling through: {err}"),
            }
        }

        let provider_name = self.router.route(query).await?;
        let Some(provider) = self.registry.get(&provider_name).await else {
            return Err(CoreError::NoCapableProvider);
        };

        let breaker = self.breakers.get_or_create(&provider_name).await;
        let retry = crate::retry::RetryEngine::new(self.retry_config());
        let executor = ResilientExecutor::new(breaker, retry);

        let query_for_call = query.clone();
        let provider_for_call = provider.clone();
        let outcome = executor
            .execute(move || {
                let provider = provider_for_call.clone();
                let query = query_for_call.clone();
                async move { provider.get_data(&query).await }
            })
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        self.router
            .record_outcome(&provider_name, outcome.is_ok(), latency_ms)
            .await;

        let response = outcome?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(query, response.clone()).await {
                tracing::warn!("cache write failed: {err}");
            }
        }

        Ok(response)
    }

    /// Finite, non-restartable stream over the same rows `get`/`execute`
    /// would return (§6, §4.1 default `stream_data`). Bypasses the cache —
    /// streaming is for callers pulling fresh data, not replaying a cached
    /// response.
    pub async fn stream(&self, query: &DataQuery) -> Result<Vec<DataPoint>, CoreError> {
        let provider_name = self.router.route(query).await?;
        let Some(provider) = self.registry.get(&provider_name).await else {
            return Err(CoreError::NoCapableProvider);
        };
        let result = provider.stream_data(query).await;
        self.router
            .record_outcome(&provider_name, result.is_ok(), 0)
            .await;
        result
    }

    /// Fan out many queries through the batch processor (§6, §4.8).
    pub async fn batch(&self, queries: Vec<DataQuery>) -> BatchResult {
        self.batch.process_batch(queries, self.config.batch.clone().into()).await
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn repository(&self) -> Option<&Arc<Repository>> {
        self.repository.as_ref()
    }

    fn retry_config(&self) -> crate::retry::RetryConfig {
        crate::retry::RetryConfig {
            max_attempts: self.config.providers.max_retries,
            base_delay: std::time::Duration::from_secs(1),
            max_delay: self.config.providers.max_backoff,
            exponential_base: self.config.providers.backoff_factor,
            jitter: true,
        }
    }
}

impl From<crate::config::BatchConfig> for BatchConfig {
    fn from(cfg: crate::config::BatchConfig) -> Self {
        BatchConfig {
            concurrent_limit: cfg.default_concurrency,
            ..BatchConfig::default()
        }
    }
}

/// Assembles a `Client` from a config and a set of registered providers.
/// Mirrors the teacher's `StandaloneClientBuilder` shape — accumulate
/// providers, then `build()` wires registry/router/cache/batch together.
#[derive(Default)]
pub struct ClientBuilder {
    providers: Vec<Arc<dyn Provider>>,
    config: Option<CoreConfig>,
    repository: Option<Arc<Repository>>,
    with_cache: bool,
}

impl ClientBuilder {
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_repository(mut self, repository: Arc<Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.with_cache = enabled;
        self
    }

    pub async fn build(self) -> Result<Client, CoreError> {
        if self.providers.is_empty() {
            return Err(CoreError::Internal {
                message: "at least one provider must be registered".to_string(),
            });
        }

        let config = self.config.unwrap_or_default();
        let registry = Arc::new(ProviderRegistry::new());
        for provider in self.providers {
            // Duplicate names are rejected by the registry itself.
            registry.register(provider).await?;
        }

        let router = Arc::new(Router::new(registry.clone()));
        let cache = if self.with_cache && config.cache.enabled {
            let l2 = Arc::new(
                crate::cache::l2::L2Cache::open(config.cache.disk_path.as_deref())
                    .map_err(|e| CoreError::Storage { message: e.to_string() })?,
            );
            Some(Arc::new(TwoTierCache::new(config.cache.memory_size, l2)))
        } else {
            None
        };
        let batch = Arc::new(BatchProcessor::new(registry.clone(), router.clone()));
        let breakers = Arc::new(crate::circuit_breaker::CircuitBreakerRegistry::new(
            crate::circuit_breaker::CircuitBreakerConfig {
                failure_threshold: config.circuit.failure_threshold,
                recovery_timeout: config.circuit.recovery_timeout,
                half_open_max_calls: config.circuit.half_open_max_calls,
            },
        ));

        Ok(Client {
            registry,
            router,
            cache,
            repository: self.repository,
            batch,
            breakers,
            config: Arc::new(config),
        })
    }
}

/// Fluent builder producing a validated `DataQuery` (§6). Enum values are
/// constrained by the setter's type, so the only runtime validation left is
/// the symbol list and, when present, the start/end ordering.
#[derive(Default)]
pub struct QueryBuilder {
    asset: Option<AssetKind>,
    market: Option<Market>,
    symbols: Vec<String>,
    timeframe: Option<Timeframe>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    provider_hint: Option<String>,
    limit: Option<usize>,
    fields: Option<Vec<String>>,
    filters: HashMap<String, String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset(mut self, asset: AssetKind) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn market(mut self, market: impl Into<String>) -> Self {
        self.market = Some(Market::new(market));
        self
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbols.push(symbol.into());
        self
    }

    pub fn symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    /// Parses an ISO-8601 timestamp; build-time validation per §6.
    pub fn start(mut self, iso8601: &str) -> Result<Self, CoreError> {
        self.start = Some(parse_iso8601(iso8601)?);
        Ok(self)
    }

    /// Parses an ISO-8601 timestamp; build-time validation per §6.
    pub fn end(mut self, iso8601: &str) -> Result<Self, CoreError> {
        self.end = Some(parse_iso8601(iso8601)?);
        Ok(self)
    }

    pub fn provider_hint(mut self, name: impl Into<String>) -> Self {
        self.provider_hint = Some(name.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<DataQuery, CoreError> {
        if self.symbols.is_empty() {
            return Err(CoreError::CapabilityViolation {
                message: "at least one symbol is required".to_string(),
            });
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(CoreError::CapabilityViolation {
                    message: "start must not be after end".to_string(),
                });
            }
        }
        Ok(DataQuery {
            asset: self.asset.unwrap_or(AssetKind::Stock),
            market: self.market,
            symbols: self.symbols,
            timeframe: self.timeframe.unwrap_or(Timeframe::Day1),
            start: self.start,
            end: self.end,
            provider_hint: self.provider_hint,
            limit: self.limit,
            fields: self.fields,
            filters: self.filters,
        })
    }
}

fn parse_iso8601(value: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::CapabilityViolation {
            message: format!("invalid ISO-8601 timestamp '{value}': {e}"),
        })
}
