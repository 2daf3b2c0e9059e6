//! Router (§4.3): capability filter via the registry, multi-factor scoring,
//! best-of-N selection, and post-call score updates.
//!
//! Structurally grounded in the teacher's `routing.rs` (`Router` struct
//! holding per-provider state, `select_provider`-style dispatch,
//! `update_stats` called after the call completes). The scoring formula
//! itself is the specification's own closed form, not the teacher's
//! stats-based filter nor the original Python router's ad hoc weighting —
//! see DESIGN.md.

use crate::error::CoreError;
use crate::models::{DataQuery, ProviderScore};
use crate::registry::ProviderRegistry;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sticky per-provider score map. Reads are lock-free snapshots (a stale
/// score is tolerable per §5); writes take the mutex.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    scores: Mutex<HashMap<String, ProviderScore>>,
}

/// One candidate's computed score, kept for diagnostics/decision logging.
#[derive(Debug, Clone)]
pub struct ScoredProvider {
    pub name: String,
    pub score: f64,
}

impl Router {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            scores: Mutex::new(HashMap::new()),
        }
    }

    async fn history_of(&self, name: &str) -> f64 {
        self.scores.lock().await.get(name).map(|s| s.value).unwrap_or(1.0)
    }

    /// `findCapable` -> fail if empty -> single candidate short-circuits ->
    /// otherwise score every candidate and take the max, ties broken by
    /// insertion (registry iteration) order.
    pub async fn route(&self, query: &DataQuery) -> Result<String, CoreError> {
        let candidates = self.registry.find_capable(query).await;
        if candidates.is_empty() {
            return Err(CoreError::NoCapableProvider);
        }
        if candidates.len() == 1 {
            return Ok(candidates[0].name().to_string());
        }

        let mut best_name = candidates[0].name().to_string();
        let mut best_score = f64::MIN;
        for provider in &candidates {
            let capability = provider.capability();
            let history = self.history_of(provider.name()).await.clamp(0.1, 2.0);
            let delay = (capability.data_delay_seconds as f64).min(100.0);
            let symbol_load_ratio = if capability.max_symbols_per_request == 0 {
                0.0
            } else {
                query.symbols.len() as f64 / capability.max_symbols_per_request as f64
            };
            let score = 0.4 * history
                + 0.3 * (1.0 - delay / 100.0)
                + 0.2 * (1.0 - 0.5 * symbol_load_ratio)
                + 0.1;
            if score > best_score {
                best_score = score;
                best_name = provider.name().to_string();
            }
        }
        Ok(best_name)
    }

    /// Score every capable candidate without selecting — used for
    /// diagnostics/decision logging, mirroring the original router's
    /// `get_routing_decision_log`.
    pub async fn score_candidates(&self, query: &DataQuery) -> Vec<ScoredProvider> {
        let candidates = self.registry.find_capable(query).await;
        let mut scored = Vec::with_capacity(candidates.len());
        for provider in &candidates {
            let capability = provider.capability();
            let history = self.history_of(provider.name()).await.clamp(0.1, 2.0);
            let delay = (capability.data_delay_seconds as f64).min(100.0);
            let symbol_load_ratio = if capability.max_symbols_per_request == 0 {
                0.0
            } else {
                query.symbols.len() as f64 / capability.max_symbols_per_request as f64
            };
            let score = 0.4 * history
                + 0.3 * (1.0 - delay / 100.0)
                + 0.2 * (1.0 - 0.5 * symbol_load_ratio)
                + 0.1;
            scored.push(ScoredProvider {
                name: provider.name().to_string(),
                score,
            });
        }
        scored
    }

    /// Post-call score update (§4.3): success nudges history up (more for
    /// lower latency), failure pulls it down; clamped to [0.1, 2.0].
    pub async fn record_outcome(&self, provider: &str, success: bool, latency_ms: u64) {
        let mut scores = self.scores.lock().await;
        let entry = scores.entry(provider.to_string()).or_default();
        let delta = if success {
            0.05 + (0.1 - latency_ms as f64 / 1000.0).max(0.0)
        } else {
            -0.2
        };
        entry.value = (entry.value + delta).clamp(0.1, 2.0);
        entry.last_updated = Utc::now();
    }

    pub async fn score_of(&self, provider: &str) -> f64 {
        self.history_of(provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, Market, Timeframe};
    use crate::providers::mock::MockProvider;

    fn query(symbols: Vec<&str>) -> DataQuery {
        DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("cn")),
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
    async fn routes_to_sole_capable_provider() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(Arc::new(MockProvider::new("tushare", vec![Market::new("cn")])))
            .await
            .unwrap();
        registry
            .register(Arc::new(MockProvider::new("yahoo", vec![Market::new("us")])))
            .await
            .unwrap();
        let router = Router::new(registry);
        let selected = router.route(&query(vec!["000001"])).await.unwrap();
        assert_eq!(selected, "tushare");
    }

    #[tokio::test]
    async fn prefers_lower_delay_at_equal_history() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(Arc::new(
                MockProvider::new("A", vec![Market::new("cn")]).with_delay_seconds(5),
            ))
            .await
            .unwrap();
        registry
            .register(Arc::new(
                MockProvider::new("B", vec![Market::new("cn")]).with_delay_seconds(60),
            ))
            .await
            .unwrap();
        let router = Router::new(registry);
        let selected = router.route(&query(vec!["000001"])).await.unwrap();
        assert_eq!(selected, "A");
    }

    #[tokio::test]
    async fn no_capable_provider_errors() {
        let registry = Arc::new(ProviderRegistry::new());
        let router = Router::new(registry);
        assert!(router.route(&query(vec!["000001"])).await.is_err());
    }
}
