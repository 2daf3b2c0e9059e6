//! Cache-key derivation and TTL selection (§4.6).
//!
//! Keys are SHA-256 of the query's canonical form, truncated to 16 hex
//! characters — stable across process restarts (round-trip law R2), unlike
//! a `DefaultHasher`-derived key, which is explicitly *not* guaranteed
//! stable between runs of the same program.

use crate::models::{DataQuery, Timeframe};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Derive the cache key for a query from its canonical form.
pub fn derive_key(query: &DataQuery) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.canonical().as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 16)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(chars);
    for byte in bytes {
        if out.len() >= chars {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out.truncate(chars);
    out
}

/// L2 (repository-backed) TTL for a given bar size. Only `tick` (5s),
/// 1-minute (60s) and 5-minute (300s) bars are pinned by name; the
/// remaining intraday bars are placed within the stated 60-300s band by bar
/// size, and anything coarser than 1h is treated as daily-equivalent.
pub fn l2_ttl(timeframe: Timeframe) -> Duration {
    match timeframe {
        Timeframe::Tick => Duration::from_secs(5),
        Timeframe::Minute1 => Duration::from_secs(60),
        Timeframe::Minute5 | Timeframe::Minute15 | Timeframe::Hour1 => Duration::from_secs(300),
        Timeframe::Hour4 | Timeframe::Day1 => Duration::from_secs(3600),
        Timeframe::Week1 | Timeframe::Month1 => Duration::from_secs(86_400),
    }
}

/// L1 (in-process) TTL: half the L2 TTL, capped at 5 minutes, so a stale L1
/// entry never outlives its L2 backing for long.
pub fn l1_ttl(timeframe: Timeframe) -> Duration {
    let l2 = l2_ttl(timeframe);
    l2.min(Duration::from_secs(600)) / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, Market};
    use std::collections::HashMap;

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
            filters: HashMap::new(),
        }
    }

    #[test]
    fn key_is_stable_and_order_independent() {
        let a = derive_key(&query(vec!["AAPL", "MSFT"]));
        let b = derive_key(&query(vec!["MSFT", "AAPL"]));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn distinct_queries_hash_differently() {
        let a = derive_key(&query(vec!["AAPL"]));
        let b = derive_key(&query(vec!["MSFT"]));
        assert_ne!(a, b);
    }

    #[test]
    fn ttl_grows_with_bar_size() {
        assert!(l2_ttl(Timeframe::Tick) < l2_ttl(Timeframe::Minute1));
        assert!(l2_ttl(Timeframe::Minute1) < l2_ttl(Timeframe::Day1));
        assert!(l2_ttl(Timeframe::Day1) < l2_ttl(Timeframe::Week1));
    }

    #[test]
    fn l1_ttl_never_exceeds_l2_ttl() {
        for tf in [
            Timeframe::Tick,
            Timeframe::Minute1,
            Timeframe::Day1,
            Timeframe::Week1,
        ] {
            assert!(l1_ttl(tf) <= l2_ttl(tf));
        }
    }
}
