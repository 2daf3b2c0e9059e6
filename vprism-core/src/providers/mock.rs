//! An in-memory `Provider` used by tests and by the CLI demo. Not a
//! concrete vendor adapter — it deterministically serves canned rows so
//! router/breaker/cache/batch behavior can be exercised without network
//! access.

use super::Provider;
use crate::error::CoreError;
use crate::models::{
    AssetKind, DataPoint, DataQuery, DataResponse, Market, ProviderCapability, ProviderInfo,
    ResponseMetadata, Timeframe,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// A deterministic provider whose behavior (failure, latency) is tunable at
/// construction time.
pub struct MockProvider {
    name: String,
    capability: ProviderCapability,
    fail: AtomicBool,
    latency: Duration,
    calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, markets: Vec<Market>) -> Self {
        Self {
            name: name.into(),
            capability: ProviderCapability {
                supported_assets: vec![AssetKind::Stock],
                supported_markets: markets,
                supported_timeframes: vec![Timeframe::Day1, Timeframe::Minute1],
                max_symbols_per_request: 50,
                supports_realtime: false,
                supports_historical: true,
                data_delay_seconds: 5,
                rate_limit: None,
            },
            fail: AtomicBool::new(false),
            latency: Duration::from_millis(0),
            calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }

    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.capability.data_delay_seconds = seconds;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Flip the provider into (or out of) a failing state; used by tests
    /// that drive the circuit breaker and retry engine.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// High-water mark of concurrently in-flight `get_data` calls, observed
    /// since construction.
    pub fn max_concurrent_calls(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capability(&self) -> ProviderCapability {
        self.capability.clone()
    }

    async fn authenticate(&self) -> Result<bool, CoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(!self.fail.load(Ordering::SeqCst))
    }

    async fn get_data(&self, query: &DataQuery) -> Result<DataResponse, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::ProviderTransient {
                provider: self.name.clone(),
                message: "mock provider configured to fail".into(),
            });
        }

        let data: Vec<DataPoint> = query
            .symbols
            .iter()
            .map(|symbol| DataPoint {
                symbol: symbol.clone(),
                timestamp: chrono::Utc::now(),
                open: rust_decimal::Decimal::new(100, 0),
                high: rust_decimal::Decimal::new(105, 0),
                low: rust_decimal::Decimal::new(95, 0),
                close: rust_decimal::Decimal::new(102, 0),
                volume: rust_decimal::Decimal::new(10_000, 0),
                amount: None,
                provider: self.name.clone(),
                extra: Default::default(),
            })
            .collect();

        Ok(DataResponse {
            metadata: ResponseMetadata {
                total_records: data.len(),
                execution_time_ms: self.latency.as_secs_f64() * 1000.0,
                cache_hit: false,
                data_source: self.name.clone(),
                quality_score: None,
                warnings: vec![],
            },
            data,
            source: ProviderInfo {
                name: self.name.clone(),
                endpoint: format!("mock://{}", self.name),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_one_point_per_symbol() {
        let provider = MockProvider::new("mockA", vec![Market::new("us")]);
        let query = DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("us")),
            symbols: vec!["AAPL".into(), "MSFT".into()],
            timeframe: Timeframe::Day1,
            start: None,
            end: None,
            provider_hint: None,
            limit: None,
            fields: None,
            filters: Default::default(),
        };
        let response = provider.get_data(&query).await.unwrap();
        assert_eq!(response.data.len(), 2);
    }

    #[tokio::test]
    async fn fails_when_flipped() {
        let provider = MockProvider::new("mockA", vec![Market::new("us")]);
        provider.set_failing(true);
        let query = DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("us")),
            symbols: vec!["AAPL".into()],
            timeframe: Timeframe::Day1,
            start: None,
            end: None,
            provider_hint: None,
            limit: None,
            fields: None,
            filters: Default::default(),
        };
        assert!(provider.get_data(&query).await.is_err());
    }
}
