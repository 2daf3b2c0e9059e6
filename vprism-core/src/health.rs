//! Health checker (§4.2): periodically probes every registered provider and
//! feeds the outcome into the registry's hysteresis state machine. Probing
//! never blocks query serving — each probe is an independent task, and the
//! registry's write lock is held only for the duration of the in-memory
//! update, never across the probe's own network call.

use crate::registry::ProviderRegistry;
use crate::repository::Repository;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HealthCheckerConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Default for HealthCheckerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            success_threshold: 2,
        }
    }
}

pub struct HealthChecker {
    registry: Arc<ProviderRegistry>,
    config: HealthCheckerConfig,
    repository: Option<Arc<Repository>>,
}

impl HealthChecker {
    pub fn new(registry: Arc<ProviderRegistry>, config: HealthCheckerConfig) -> Self {
        Self {
            registry,
            config,
            repository: None,
        }
    }

    /// Mirror probe outcomes into a columnar store so health state survives
    /// process restarts (§4.7 `provider_status`).
    pub fn with_repository(mut self, repository: Arc<Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Probe every registered provider once, each under its own timeout, and
    /// record the outcome. Returns the number of providers probed.
    pub async fn probe_all(&self) -> usize {
        let names = self.registry.names().await;
        for name in &names {
            self.probe_one(name).await;
        }
        names.len()
    }

    async fn probe_one(&self, name: &str) {
        let Some(provider) = self.registry.get(name).await else {
            return;
        };
        let outcome = tokio::time::timeout(self.config.probe_timeout, provider.health_check()).await;
        let success = matches!(outcome, Ok(Ok(true)));
        self.registry
            .record_probe(
                name,
                success,
                self.config.failure_threshold,
                self.config.success_threshold,
            )
            .await;

        if let Some(repository) = &self.repository {
            if let Some(health) = self.registry.health(name).await {
                let status = format!("{:?}", health.status);
                if let Err(error) = repository
                    .save_provider_status(
                        name.to_string(),
                        status,
                        health.consecutive_successes,
                        health.consecutive_failures,
                        health.total_probes,
                        health.total_failures,
                        health.last_probe,
                    )
                    .await
                {
                    tracing::warn!(provider = name, %error, "failed to persist provider status");
                }
            }
        }
    }

    /// Run `probe_all` on a fixed interval until the returned handle is
    /// aborted or dropped.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            loop {
                ticker.tick().await;
                let probed = self.probe_all().await;
                tracing::debug!(providers = probed, "health probe round complete");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;
    use crate::providers::mock::MockProvider;

    #[tokio::test]
    async fn a_failing_provider_becomes_unhealthy_after_threshold_probes() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = Arc::new(MockProvider::new("tushare", vec![Market::new("cn")]));
        registry.register(provider.clone()).await.unwrap();

        let checker = HealthChecker::new(
            registry.clone(),
            HealthCheckerConfig {
                interval: Duration::from_secs(1),
                probe_timeout: Duration::from_secs(1),
                failure_threshold: 2,
                success_threshold: 2,
            },
        );

        provider.set_failing(true);
        checker.probe_all().await;
        assert_eq!(
            registry.health("tushare").await.unwrap().status,
            crate::models::HealthState::Healthy
        );
        checker.probe_all().await;
        assert_eq!(
            registry.health("tushare").await.unwrap().status,
            crate::models::HealthState::Unhealthy
        );
    }

    #[tokio::test]
    async fn a_slow_provider_times_out_as_a_failed_probe() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = Arc::new(
            MockProvider::new("slow", vec![Market::new("cn")])
                .with_latency(Duration::from_millis(50)),
        );
        registry.register(provider).await.unwrap();

        let checker = HealthChecker::new(
            registry.clone(),
            HealthCheckerConfig {
                interval: Duration::from_secs(1),
                probe_timeout: Duration::from_millis(5),
                failure_threshold: 1,
                success_threshold: 1,
            },
        );

        checker.probe_all().await;
        assert_eq!(
            registry.health("slow").await.unwrap().status,
            crate::models::HealthState::Unhealthy
        );
    }

    #[tokio::test]
    async fn probing_with_a_repository_persists_provider_status() {
        let registry = Arc::new(ProviderRegistry::new());
        let provider = Arc::new(MockProvider::new("tushare", vec![Market::new("cn")]));
        registry.register(provider).await.unwrap();
        let repository = Repository::open(None).unwrap();

        let checker = HealthChecker::new(registry.clone(), HealthCheckerConfig::default())
            .with_repository(repository.clone());
        checker.probe_all().await;

        let status = repository
            .get_provider_status("tushare".to_string())
            .await
            .unwrap()
            .expect("provider status row");
        assert_eq!(status, "Healthy");
    }
}
