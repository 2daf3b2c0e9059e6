//! Batch processor (§4.8): runs many queries concurrently, grouped by the
//! provider the router selects for each one, with its own bounded
//! concurrency and timeout/backoff — independent of (and layered on top of)
//! the circuit breaker/retry engine used for single-query calls.
//!
//! Grounded on the original implementation's `batch_processor.py`:
//! provider-grouping via the router, per-group semaphore, per-query
//! `retryDelay * 2^attempt` backoff, and the `"<providerName>_<index>"`
//! result-key scheme.

use crate::error::CoreError;
use crate::models::{DataQuery, DataResponse, Market, Timeframe};
use crate::registry::ProviderRegistry;
use crate::router::Router;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrent_limit: usize,
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrent_limit: 10,
            timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct BatchResult {
    pub results: HashMap<String, DataResponse>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_time: Duration,
    pub errors: HashMap<String, String>,
}

pub struct BatchProcessor {
    registry: Arc<ProviderRegistry>,
    router: Arc<Router>,
}

impl BatchProcessor {
    pub fn new(registry: Arc<ProviderRegistry>, router: Arc<Router>) -> Self {
        Self { registry, router }
    }

    pub async fn process_batch(&self, queries: Vec<DataQuery>, config: BatchConfig) -> BatchResult {
        let start = Instant::now();

        let mut groups: HashMap<String, Vec<DataQuery>> = HashMap::new();
        let mut results = HashMap::new();
        let mut errors = HashMap::new();
        let mut failure_count = 0usize;
        for (index, query) in queries.into_iter().enumerate() {
            match self.router.route(&query).await {
                Ok(provider) => groups.entry(provider).or_default().push(query),
                Err(err) => {
                    let query_id = format!("unrouted_{index}");
                    let message = err.to_string();
                    results.insert(
                        query_id.clone(),
                        DataResponse::empty_with_error("unrouted", &message),
                    );
                    errors.insert(query_id, message);
                    failure_count += 1;
                }
            }
        }

        let group_futures = groups.into_iter().map(|(provider_name, queries)| {
            let registry = self.registry.clone();
            let config = config.clone();
            async move { Self::process_provider_group(registry, provider_name, queries, config).await }
        });
        let group_results = futures::future::join_all(group_futures).await;

        let mut success_count = 0usize;

        for group in group_results {
            for (query_id, outcome) in group {
                match outcome {
                    Ok(response) => {
                        success_count += 1;
                        results.insert(query_id, response);
                    }
                    Err((response, message)) => {
                        failure_count += 1;
                        errors.insert(query_id.clone(), message);
                        results.insert(query_id, response);
                    }
                }
            }
        }

        BatchResult {
            results,
            success_count,
            failure_count,
            total_time: start.elapsed(),
            errors,
        }
    }

    async fn process_provider_group(
        registry: Arc<ProviderRegistry>,
        provider_name: String,
        queries: Vec<DataQuery>,
        config: BatchConfig,
    ) -> Vec<(String, Result<DataResponse, (DataResponse, String)>)> {
        let semaphore = Arc::new(Semaphore::new(config.concurrent_limit.max(1)));
        let futures = queries.into_iter().enumerate().map(|(index, query)| {
            let registry = registry.clone();
            let provider_name = provider_name.clone();
            let semaphore = semaphore.clone();
            let config = config.clone();
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let query_id = format!("{provider_name}_{index}");
                let outcome = Self::run_single_query(&registry, &provider_name, &query, &config).await;
                (query_id, outcome)
            }
        });
        futures::future::join_all(futures).await
    }

    async fn run_single_query(
        registry: &ProviderRegistry,
        provider_name: &str,
        query: &DataQuery,
        config: &BatchConfig,
    ) -> Result<DataResponse, (DataResponse, String)> {
        let Some(provider) = registry.get(provider_name).await else {
            return Err((
                DataResponse::empty_with_error(provider_name, "provider no longer registered"),
                "provider no longer registered".to_string(),
            ));
        };

        for attempt in 0..=config.retry_count {
            match tokio::time::timeout(config.timeout, provider.get_data(query)).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => {
                    if attempt == config.retry_count {
                        return Err((
                            DataResponse::empty_with_error(provider_name, err.to_string()),
                            err.to_string(),
                        ));
                    }
                    tokio::time::sleep(config.retry_delay * 2u32.pow(attempt)).await;
                }
                Err(_) => {
                    if attempt == config.retry_count {
                        let message = format!("query timeout after {} retries", config.retry_count);
                        return Err((DataResponse::empty_with_error(provider_name, &message), message));
                    }
                    tokio::time::sleep(config.retry_delay * 2u32.pow(attempt)).await;
                }
            }
        }
        unreachable!("loop always returns on the final attempt")
    }

    /// Convenience wrapper building one single-symbol query per symbol for
    /// the same market/timeframe/range, mirroring the original's
    /// `process_optimized_batch`.
    pub async fn get_market_data_batch(
        &self,
        symbols: Vec<String>,
        market: Market,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        config: BatchConfig,
    ) -> BatchResult {
        let queries = symbols
            .into_iter()
            .map(|symbol| DataQuery {
                asset: crate::models::AssetKind::Stock,
                market: Some(market.clone()),
                symbols: vec![symbol],
                timeframe,
                start: Some(start),
                end: Some(end),
                provider_hint: None,
                limit: None,
                fields: None,
                filters: Default::default(),
            })
            .collect();
        self.process_batch(queries, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetKind;
    use crate::providers::mock::MockProvider;

    fn query(symbols: Vec<&str>) -> DataQuery {
        DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("us")),
            symbols: symbols.into_iter().map(String::from).collect(),
            timeframe: Timeframe::Day1,
            start: None,
            end: None,
            provider_hint: None,
            limit: None,
            fields: None,
            filters: Default::default(),
        }
    }

    #[tokio::test]
    async fn all_queries_succeed_and_are_keyed_by_provider_and_index() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(Arc::new(MockProvider::new("tushare", vec![Market::new("us")])))
            .await
            .unwrap();
        let router = Arc::new(Router::new(registry.clone()));
        let processor = BatchProcessor::new(registry, router);

        let queries = vec![query(vec!["AAPL"]), query(vec!["MSFT"])];
        let result = processor.process_batch(queries, BatchConfig::default()).await;

        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 0);
        assert!(result.results.contains_key("tushare_0"));
        assert!(result.results.contains_key("tushare_1"));
    }

    #[tokio::test]
    async fn unroutable_query_counts_as_a_failure() {
        let registry = Arc::new(ProviderRegistry::new());
        let router = Arc::new(Router::new(registry.clone()));
        let processor = BatchProcessor::new(registry, router);

        let result = processor
            .process_batch(vec![query(vec!["AAPL"])], BatchConfig::default())
            .await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.success_count, 0);
        assert!(result.errors.contains_key("unrouted_0"));
    }

    #[tokio::test]
    async fn exhausted_retries_produce_an_error_entry_with_empty_data() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = Arc::new(MockProvider::new("tushare", vec![Market::new("us")]));
        provider.set_failing(true);
        registry.register(provider).await.unwrap();
        let router = Arc::new(Router::new(registry.clone()));
        let processor = BatchProcessor::new(registry, router);

        let config = BatchConfig {
            retry_count: 1,
            retry_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let result = processor.process_batch(vec![query(vec!["AAPL"])], config).await;
        assert_eq!(result.failure_count, 1);
        assert!(result.errors.contains_key("tushare_0"));
        assert!(result.results["tushare_0"].data.is_empty());
    }

    /// Boundary scenario 7: 20 queries, `concurrentLimit=5`, each provider
    /// call sleeping 50ms. Wall time must land in [200ms, 300ms] (4 waves of
    /// 5) and at most 5 calls may ever be in flight at once.
    #[tokio::test]
    async fn concurrency_is_bounded_by_the_configured_limit() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = Arc::new(
            MockProvider::new("tushare", vec![Market::new("us")])
                .with_latency(Duration::from_millis(50)),
        );
        registry.register(provider.clone()).await.unwrap();
        let router = Arc::new(Router::new(registry.clone()));
        let processor = BatchProcessor::new(registry, router);

        let queries: Vec<DataQuery> = (0..20).map(|i| query(vec![&format!("SYM{i}")])).collect();
        let config = BatchConfig {
            concurrent_limit: 5,
            ..Default::default()
        };

        let start = Instant::now();
        let result = processor.process_batch(queries, config).await;
        let elapsed = start.elapsed();

        assert_eq!(result.success_count, 20);
        assert!(
            elapsed >= Duration::from_millis(200) && elapsed <= Duration::from_millis(300),
            "wall time {elapsed:?} outside [200ms, 300ms]"
        );
        assert_eq!(provider.max_concurrent_calls(), 5);
    }
}
