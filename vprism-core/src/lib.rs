//! # vprism-core
//!
//! A unified financial market-data access layer. Upstream vendors (exchange
//! feeds, broker APIs, public aggregators) each expose idiosyncratic
//! endpoints, symbol encodings, rate limits, authentication schemes and data
//! quality; this crate presents one coherent query surface — asset × market
//! × symbol(s) × timeframe × time range — and internally chooses a
//! provider, enforces concurrency and rate limits, applies resilience
//! (retries, circuit breakers), caches results in a two-tier hierarchy,
//! persists normalized OHLCV records in a columnar store, and validates
//! data quality and cross-source consistency.
//!
//! ## Data flow for a query
//!
//! caller -> [`router::Router`] selects a capable [`providers::Provider`] ->
//! [`executor::ResilientExecutor`] (circuit breaker wrapping retry wrapping
//! the call) -> on a cache miss the provider fetches raw rows ->
//! [`ingestion`] normalizes and scores them -> [`cache::TwoTierCache`]
//! (write-through L1 -> L2) -> [`repository::Repository`] persists -> the
//! response returns to the caller. Independently, [`health::HealthChecker`]
//! periodically probes providers; [`registry::ProviderRegistry`] tracks
//! health and capability metadata; the router excludes unhealthy providers
//! and ranks the survivors.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vprism_core::providers::mock::MockProvider;
//! use vprism_core::{Client, Market};
//!
//! # async fn run() -> Result<(), vprism_core::CoreError> {
//! let client = Client::builder()
//!     .with_provider(Arc::new(MockProvider::new("tushare", vec![Market::new("cn")])))
//!     .with_cache(true)
//!     .build()
//!     .await?;
//!
//! let query = vprism_core::QueryBuilder::new()
//!     .asset(vprism_core::AssetKind::Stock)
//!     .market("cn")
//!     .symbol("000001")
//!     .timeframe(vprism_core::Timeframe::Day1)
//!     .build()?;
//!
//! let response = client.get(&query).await?;
//! println!("{} rows from {}", response.data.len(), response.source.name);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module map
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`models`] | Entities, enums, query/response value objects (§3). |
//! | [`error`] | Sealed `CoreError` taxonomy (§7). |
//! | [`providers`] | The `Provider` trait contract (§4.1). |
//! | [`registry`] | Provider registration and health bookkeeping (§4.2). |
//! | [`router`] | Capability filter, scoring, provider selection (§4.3). |
//! | [`circuit_breaker`] | Closed/open/half-open state machine (§4.4). |
//! | [`retry`] | Exponential backoff with jitter (§4.5). |
//! | [`executor`] | Breaker-outside-retry composition glue (§4.5). |
//! | [`health`] | Periodic provider health probing (§4.2). |
//! | [`cache`] | Two-tier (L1 memory + L2 columnar) cache (§4.6). |
//! | [`repository`] | Columnar schema and persistence (§4.7). |
//! | [`batch`] | Provider-grouped bounded-concurrency fan-out (§4.8). |
//! | [`ingestion`] | Raw-row validation, quality scoring, commit (§4.9). |
//! | [`consistency`] | Cross-source divergence reporting (§4.10). |
//! | [`config`] | Layered `CoreConfig` (§6). |
//! | [`client`] | The caller-facing `get`/`execute`/`stream`/`batch` surface (§6). |

pub mod batch;
pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod consistency;
pub mod error;
pub mod executor;
pub mod health;
pub mod ingestion;
pub mod models;
pub mod providers;
pub mod registry;
pub mod repository;
pub mod retry;
pub mod router;

pub use batch::{BatchConfig, BatchProcessor, BatchResult};
pub use cache::TwoTierCache;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState};
pub use client::{Client, ClientBuilder, QueryBuilder};
pub use config::CoreConfig;
pub use consistency::{ConsistencyReport, ConsistencyValidator};
pub use error::CoreError;
pub use executor::ResilientExecutor;
pub use health::{HealthChecker, HealthCheckerConfig};
pub use ingestion::{IngestionResult, QualityLevel, QualityScore, RawRecord, ValidationIssue};
pub use models::{
    Asset, AssetKind, DataPoint, DataQuery, DataRecord, DataResponse, HealthState, Market,
    ProviderCapability, ProviderHealth, ProviderInfo, ProviderScore, RateLimitDescriptor,
    ResponseMetadata, Timeframe,
};
pub use providers::{Provider, ProviderConfig};
pub use registry::ProviderRegistry;
pub use repository::{Repository, StoredQualityScore};
pub use retry::{RetryConfig, RetryEngine};
pub use router::{Router, ScoredProvider};

/// Convenience result alias for core operations; the error type is always
/// [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
