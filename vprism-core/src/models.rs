//! Core data model: assets, data points, queries, responses and the
//! provider-capability/health/score types that the rest of the crate
//! operates over.
//!
//! These types are plain value objects (§3 of the design): no I/O, no
//! interior mutability. Mutable, cross-query state (health, score, circuit
//! state) lives in the registry, router and circuit-breaker modules
//! respectively, each keyed by provider name.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Broad asset classes the layer can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Stock,
    Etf,
    Fund,
    Bond,
    Future,
    Option,
    Crypto,
    Forex,
    Index,
}

/// Market / exchange jurisdiction a symbol trades in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market(pub String);

impl Market {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_lowercase())
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bar size / sampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    Tick,
    Minute1,
    Minute5,
    Minute15,
    Hour1,
    Hour4,
    Day1,
    Week1,
    Month1,
}

impl Timeframe {
    /// True when this timeframe belongs in the intraday table rather than
    /// the daily one. Resolved per SPEC_FULL §9 Open Question (a): routing
    /// is by declared timeframe, never by inspecting a timestamp's
    /// time-of-day component.
    pub fn is_intraday(&self) -> bool {
        !matches!(self, Timeframe::Day1 | Timeframe::Week1 | Timeframe::Month1)
    }

    /// Short code used as the `timeframe` column value / cache key segment.
    pub fn code(&self) -> &'static str {
        match self {
            Timeframe::Tick => "tick",
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
            Timeframe::Month1 => "1M",
        }
    }

    /// Inverse of [`Timeframe::code`]; `None` for an unrecognized code.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "tick" => Timeframe::Tick,
            "1m" => Timeframe::Minute1,
            "5m" => Timeframe::Minute5,
            "15m" => Timeframe::Minute15,
            "1h" => Timeframe::Hour1,
            "4h" => Timeframe::Hour4,
            "1d" => Timeframe::Day1,
            "1w" => Timeframe::Week1,
            "1M" => Timeframe::Month1,
            _ => return None,
        })
    }
}

/// A long-lived reference row describing a tradeable instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub name: Option<String>,
    pub kind: AssetKind,
    pub market: Market,
    pub currency: Option<String>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    /// Supplemental, carried from the original schema (`is_active`).
    pub is_active: bool,
    /// Supplemental (`first_traded`), optional.
    pub first_traded: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

/// One OHLCV sample, immutable once emitted by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub amount: Option<Decimal>,
    pub provider: String,
    pub extra: HashMap<String, String>,
}

impl DataPoint {
    /// Invariant I1: `low <= open,close <= high`; `volume >= 0`;
    /// `timestamp <= now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
            && self.volume >= Decimal::ZERO
            && self.timestamp <= now
    }
}

/// A single call's query parameters. One query per call; value-equal
/// queries must canonicalize to the same cache key (I3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataQuery {
    pub asset: AssetKind,
    pub market: Option<Market>,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub provider_hint: Option<String>,
    pub limit: Option<usize>,
    pub fields: Option<Vec<String>>,
    pub filters: HashMap<String, String>,
}

impl DataQuery {
    /// Canonical form used for cache-key derivation (§4.3): symbols sorted
    /// and comma-joined, missing fields render as `None`.
    pub fn canonical(&self) -> String {
        let mut symbols = self.symbols.clone();
        symbols.sort();
        format!(
            "{:?}|{}|{}|{:?}|{}|{}",
            self.asset,
            self.market.as_ref().map(|m| m.0.as_str()).unwrap_or("None"),
            symbols.join(","),
            self.timeframe,
            self.start.map(|d| d.to_rfc3339()).unwrap_or_else(|| "None".into()),
            self.end.map(|d| d.to_rfc3339()).unwrap_or_else(|| "None".into()),
        )
    }
}

/// Metadata attached to every `DataResponse`, regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseMetadata {
    pub total_records: usize,
    pub execution_time_ms: f64,
    pub cache_hit: bool,
    pub data_source: String,
    pub quality_score: Option<f64>,
    pub warnings: Vec<String>,
}

/// Identifies which provider served (or attempted to serve) a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub endpoint: String,
}

/// The result of a single query, successful or not (errors are carried as
/// empty `data` + a warning, per the propagation policy in §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Vec<DataPoint>,
    pub metadata: ResponseMetadata,
    pub source: ProviderInfo,
}

impl DataResponse {
    pub fn empty_with_error(provider: &str, message: impl Into<String>) -> Self {
        let mut metadata = ResponseMetadata {
            data_source: provider.to_string(),
            ..Default::default()
        };
        metadata.warnings.push(message.into());
        Self {
            data: vec![],
            metadata,
            source: ProviderInfo {
                name: provider.to_string(),
                endpoint: provider.to_string(),
            },
        }
    }
}

/// Rate-limit descriptor attached to a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDescriptor {
    pub requests_per_minute: u32,
}

/// Static, pure description of what a provider can serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapability {
    pub supported_assets: Vec<AssetKind>,
    pub supported_markets: Vec<Market>,
    pub supported_timeframes: Vec<Timeframe>,
    pub max_symbols_per_request: usize,
    pub supports_realtime: bool,
    pub supports_historical: bool,
    pub data_delay_seconds: u32,
    pub rate_limit: Option<RateLimitDescriptor>,
}

impl ProviderCapability {
    /// capability ⊇ query requirements, symbol count within bound (§4.1).
    pub fn accepts(&self, query: &DataQuery) -> bool {
        if !self.supported_assets.contains(&query.asset) {
            return false;
        }
        if let Some(market) = &query.market {
            if !self.supported_markets.contains(market) {
                return false;
            }
        }
        if !self.supported_timeframes.contains(&query.timeframe) {
            return false;
        }
        if query.symbols.len() > self.max_symbols_per_request {
            return false;
        }
        true
    }
}

/// Health state tracked by the registry, mutated only by the health
/// checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub last_probe: Option<DateTime<Utc>>,
    pub status: HealthState,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_probes: u64,
    pub total_failures: u64,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            last_probe: None,
            status: HealthState::Healthy,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_probes: 0,
            total_failures: 0,
        }
    }
}

/// Sticky per-provider score maintained by the router (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderScore {
    pub value: f64,
    pub last_updated: DateTime<Utc>,
}

impl Default for ProviderScore {
    fn default() -> Self {
        Self {
            value: 1.0,
            last_updated: Utc::now(),
        }
    }
}

/// A normalized, persisted OHLCV row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRecord {
    pub symbol: String,
    pub asset: AssetKind,
    pub market: Market,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub amount: Option<Decimal>,
    pub provider: String,
    /// Supplemental, daily-table-only fields carried from the original
    /// schema; absent upstream data leaves these at their defaults.
    pub adjusted_close: Option<Decimal>,
    pub split_factor: Decimal,
    pub dividend_amount: Decimal,
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_ignores_symbol_order() {
        let base = DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("US")),
            symbols: vec!["AAPL".into(), "MSFT".into()],
            timeframe: Timeframe::Day1,
            start: None,
            end: None,
            provider_hint: None,
            limit: None,
            fields: None,
            filters: HashMap::new(),
        };
        let mut reordered = base.clone();
        reordered.symbols = vec!["MSFT".into(), "AAPL".into()];
        assert_eq!(base.canonical(), reordered.canonical());
    }

    #[test]
    fn data_point_validates_ohlc_relationship() {
        let now = Utc::now();
        let dp = DataPoint {
            symbol: "AAPL".into(),
            timestamp: now,
            open: Decimal::new(100, 0),
            high: Decimal::new(110, 0),
            low: Decimal::new(95, 0),
            close: Decimal::new(105, 0),
            volume: Decimal::new(1000, 0),
            amount: None,
            provider: "test".into(),
            extra: HashMap::new(),
        };
        assert!(dp.is_valid(now));

        let mut bad = dp.clone();
        bad.low = Decimal::new(120, 0);
        assert!(!bad.is_valid(now));
    }

    #[test]
    fn timeframe_code_round_trips() {
        for tf in [
            Timeframe::Tick,
            Timeframe::Minute1,
            Timeframe::Minute5,
            Timeframe::Minute15,
            Timeframe::Hour1,
            Timeframe::Hour4,
            Timeframe::Day1,
            Timeframe::Week1,
            Timeframe::Month1,
        ] {
            assert_eq!(Timeframe::from_code(tf.code()), Some(tf));
        }
        assert_eq!(Timeframe::from_code("bogus"), None);
    }
}
