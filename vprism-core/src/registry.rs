//! Provider registry (§4.2): maps provider name to `Provider` plus parallel
//! health and registration metadata. Registration fails only if the name is
//! already present; health starts `healthy`.

use crate::error::CoreError;
use crate::models::{DataQuery, HealthState, ProviderHealth};
use crate::providers::Provider;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct Entry {
    provider: Arc<dyn Provider>,
    health: ProviderHealth,
    registered_at: chrono::DateTime<Utc>,
}

/// Thread-safe registry of providers and their health state.
///
/// A single `RwLock` guards both the provider map and health map together
/// so a reader never observes a provider without its corresponding health
/// entry. Health mutation (by the health checker) takes the write lock only
/// for the duration of the in-memory update — never across a probe's
/// network I/O (locking discipline, §5).
pub struct ProviderRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider. Fails if the name is already present.
    pub async fn register(&self, provider: Arc<dyn Provider>) -> Result<(), CoreError> {
        let name = provider.name().to_string();
        let mut entries = self.entries.write().await;
        if entries.contains_key(&name) {
            return Err(CoreError::Internal {
                message: format!("provider '{name}' already registered"),
            });
        }
        entries.insert(
            name,
            Entry {
                provider,
                health: ProviderHealth::default(),
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.entries.read().await.get(name).map(|e| e.provider.clone())
    }

    pub async fn health(&self, name: &str) -> Option<ProviderHealth> {
        self.entries.read().await.get(name).map(|e| e.health.clone())
    }

    pub async fn registered_at(&self, name: &str) -> Option<chrono::DateTime<Utc>> {
        self.entries.read().await.get(name).map(|e| e.registered_at)
    }

    pub async fn names(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Providers whose capability admits the query AND whose health is not
    /// `unhealthy`.
    pub async fn find_capable(&self, query: &DataQuery) -> Vec<Arc<dyn Provider>> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.provider.can_handle(query) && e.health.status != HealthState::Unhealthy)
            .map(|e| e.provider.clone())
            .collect()
    }

    /// Apply a probe outcome, implementing the hysteresis rule from §4.2:
    /// `failure_threshold` consecutive failures -> unhealthy;
    /// `success_threshold` consecutive successes -> healthy.
    pub async fn record_probe(
        &self,
        name: &str,
        success: bool,
        failure_threshold: u32,
        success_threshold: u32,
    ) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            let health = &mut entry.health;
            health.last_probe = Some(Utc::now());
            health.total_probes += 1;
            if success {
                health.consecutive_successes += 1;
                health.consecutive_failures = 0;
                if health.consecutive_successes >= success_threshold {
                    health.status = HealthState::Healthy;
                }
            } else {
                health.consecutive_failures += 1;
                health.consecutive_successes = 0;
                health.total_failures += 1;
                if health.consecutive_failures >= failure_threshold {
                    health.status = HealthState::Unhealthy;
                }
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, Market, Timeframe};
    use crate::providers::mock::MockProvider;

    fn query() -> DataQuery {
        DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("cn")),
            symbols: vec!["000001".into()],
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
    async fn registration_fails_on_duplicate_name() {
        let registry = ProviderRegistry::new();
        let p1 = Arc::new(MockProvider::new("tushare", vec![Market::new("cn")]));
        let p2 = Arc::new(MockProvider::new("tushare", vec![Market::new("cn")]));
        registry.register(p1).await.unwrap();
        assert!(registry.register(p2).await.is_err());
    }

    #[tokio::test]
    async fn find_capable_excludes_unhealthy() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(MockProvider::new("tushare", vec![Market::new("cn")]));
        registry.register(provider).await.unwrap();

        let q = query();
        assert_eq!(registry.find_capable(&q).await.len(), 1);

        registry.record_probe("tushare", false, 1, 2).await;
        assert_eq!(registry.find_capable(&q).await.len(), 0);

        registry.record_probe("tushare", true, 1, 2).await;
        registry.record_probe("tushare", true, 1, 2).await;
        assert_eq!(registry.find_capable(&q).await.len(), 1);
    }
}
