//! # vprism-cli
//!
//! A thin demonstration binary for `vprism-core`. It carries no invariants
//! of its own: it maps `clap` subcommands onto the core's `get`/`batch`/
//! `health` operations (§6A of the design) using
//! [`vprism_core::providers::mock::MockProvider`] stand-ins, since the core
//! ships no concrete vendor wire adapters (those are out of scope — §1).
//!
//! This crate is scaffolding for exercising the core from a terminal, not a
//! designed external protocol.

use std::sync::Arc;

use vprism_core::providers::mock::MockProvider;
use vprism_core::{AssetKind, Client, CoreConfig, CoreError, Market, QueryBuilder, Timeframe};

/// Demo providers registered with the client: a fast, reliable one and a
/// slower, higher-delay one, so routing/scoring (§4.3) has something to
/// choose between and the `health` subcommand has something to probe.
pub async fn demo_client(config: CoreConfig) -> Result<Client, CoreError> {
    let fast = Arc::new(
        MockProvider::new("tushare", vec![Market::new("cn"), Market::new("us")])
            .with_delay_seconds(5),
    );
    let slow = Arc::new(
        MockProvider::new("yahoo", vec![Market::new("us")]).with_delay_seconds(60),
    );

    Client::builder()
        .with_provider(fast)
        .with_provider(slow)
        .with_config(config)
        .with_cache(true)
        .build()
        .await
}

/// Parses a CLI-friendly timeframe code (`1d`, `1h`, `5m`, `1w`, `tick`,
/// ...) into the core's `Timeframe` enum.
pub fn parse_timeframe(code: &str) -> Result<Timeframe, CoreError> {
    Timeframe::from_code(code).ok_or_else(|| CoreError::CapabilityViolation {
        message: format!("unrecognized timeframe '{code}'"),
    })
}

/// Parses a CLI-friendly asset kind (`stock`, `etf`, `crypto`, ...).
pub fn parse_asset_kind(value: &str) -> Result<AssetKind, CoreError> {
    match value.to_lowercase().as_str() {
        "stock" => Ok(AssetKind::Stock),
        "etf" => Ok(AssetKind::Etf),
        "fund" => Ok(AssetKind::Fund),
        "bond" => Ok(AssetKind::Bond),
        "future" => Ok(AssetKind::Future),
        "option" => Ok(AssetKind::Option),
        "crypto" => Ok(AssetKind::Crypto),
        "forex" => Ok(AssetKind::Forex),
        "index" => Ok(AssetKind::Index),
        other => Err(CoreError::CapabilityViolation {
            message: format!("unrecognized asset kind '{other}'"),
        }),
    }
}

/// Builds a validated query from the flattened CLI arguments of the `get`
/// and `batch` subcommands.
pub fn build_query(
    asset: &str,
    market: &str,
    symbols: &[String],
    timeframe: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<vprism_core::DataQuery, CoreError> {
    let mut builder = QueryBuilder::new()
        .asset(parse_asset_kind(asset)?)
        .market(market)
        .symbols(symbols.to_vec())
        .timeframe(parse_timeframe(timeframe)?);
    if let Some(start) = start {
        builder = builder.start(start)?;
    }
    if let Some(end) = end {
        builder = builder.end(end)?;
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_timeframe_codes() {
        assert_eq!(parse_timeframe("1d").unwrap(), Timeframe::Day1);
        assert_eq!(parse_timeframe("5m").unwrap(), Timeframe::Minute5);
        assert!(parse_timeframe("bogus").is_err());
    }

    #[test]
    fn parses_known_asset_kinds() {
        assert_eq!(parse_asset_kind("stock").unwrap(), AssetKind::Stock);
        assert_eq!(parse_asset_kind("CRYPTO").unwrap(), AssetKind::Crypto);
        assert!(parse_asset_kind("nonsense").is_err());
    }

    #[test]
    fn build_query_rejects_no_symbols() {
        let result = build_query("stock", "us", &[], "1d", None, None);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn demo_client_routes_a_basic_query() {
        let client = demo_client(CoreConfig::default()).await.unwrap();
        let query = build_query(
            "stock",
            "cn",
            &["000001".to_string()],
            "1d",
            None,
            None,
        )
        .unwrap();
        let response = client.get(&query).await.unwrap();
        assert_eq!(response.source.name, "tushare");
    }
}
