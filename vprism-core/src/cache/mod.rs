//! Two-tier cache (§4.6): L1 (in-process LRU) fronting L2 (DuckDB-backed).
//! A read checks L1 first, falls through to L2 on a miss and repopulates
//! L1 (demotion), a write goes to both tiers. Misses in both return `None`
//! without touching providers — that's the caller's (client/executor)
//! concern.

pub mod key;
pub mod l1;
pub mod l2;

use crate::error::CoreError;
use crate::models::{DataQuery, DataResponse};
use l1::L1Cache;
use l2::L2Cache;
use std::sync::Arc;

pub struct TwoTierCache {
    l1: L1Cache,
    l2: Arc<L2Cache>,
}

impl TwoTierCache {
    pub fn new(l1_capacity: usize, l2: Arc<L2Cache>) -> Self {
        Self {
            l1: L1Cache::new(l1_capacity),
            l2,
        }
    }

    /// Read-through: L1 hit returns immediately; an L2 hit is copied back
    /// into L1 (at L1's own, shorter TTL) before being returned.
    pub async fn get(&self, query: &DataQuery) -> Result<Option<DataResponse>, CoreError> {
        let cache_key = key::derive_key(query);
        if let Some(hit) = self.l1.get(&cache_key) {
            return Ok(Some(hit));
        }

        let Some(hit) = self.l2.get(cache_key.clone()).await? else {
            return Ok(None);
        };
        self.l1.put(cache_key, hit.clone(), key::l1_ttl(query.timeframe));
        Ok(Some(hit))
    }

    /// Write-through: L2 first, then L1, so a crash between the two writes
    /// leaves the durable tier holding the entry and the next read
    /// repopulates L1 from it (§4.6).
    pub async fn put(&self, query: &DataQuery, value: DataResponse) -> Result<(), CoreError> {
        let cache_key = key::derive_key(query);
        self.l2
            .put(
                cache_key.clone(),
                query.timeframe.code().to_string(),
                value.clone(),
                key::l2_ttl(query.timeframe),
            )
            .await?;
        self.l1.put(cache_key, value, key::l1_ttl(query.timeframe));
        Ok(())
    }

    /// Invalidate by exact query (§4.6): derive the key and delete from both
    /// tiers.
    pub async fn invalidate(&self, query: &DataQuery) -> Result<(), CoreError> {
        let cache_key = key::derive_key(query);
        self.l1.invalidate(&cache_key);
        self.l2.delete(cache_key).await
    }

    /// Bulk clear: drops every row in both tiers.
    pub async fn clear(&self) -> Result<(), CoreError> {
        self.l1.clear();
        self.l2.clear().await
    }

    pub async fn sweep_expired(&self) -> Result<usize, CoreError> {
        self.l2.cleanup_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, Market, ProviderInfo, ResponseMetadata, Timeframe};
    use std::collections::HashMap;

    fn query() -> DataQuery {
        DataQuery {
            asset: AssetKind::Stock,
            market: Some(Market::new("us")),
            symbols: vec!["AAPL".into()],
            timeframe: Timeframe::Day1,
            start: None,
            end: None,
            provider_hint: None,
            limit: None,
            fields: None,
            filters: HashMap::new(),
        }
    }

    fn response() -> DataResponse {
        DataResponse {
            data: vec![],
            metadata: ResponseMetadata::default(),
            source: ProviderInfo {
                name: "test".into(),
                endpoint: "mock://test".into(),
            },
        }
    }

    #[tokio::test]
    async fn miss_then_put_then_hit() {
        let cache = TwoTierCache::new(16, Arc::new(L2Cache::open(None).unwrap()));
        let q = query();
        assert!(cache.get(&q).await.unwrap().is_none());
        cache.put(&q, response()).await.unwrap();
        assert!(cache.get(&q).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_removes_from_both_tiers() {
        let l2 = Arc::new(L2Cache::open(None).unwrap());
        let cache = TwoTierCache::new(16, l2.clone());
        let q = query();
        cache.put(&q, response()).await.unwrap();
        assert!(cache.get(&q).await.unwrap().is_some());

        cache.invalidate(&q).await.unwrap();
        assert!(cache.l1.get(&key::derive_key(&q)).is_none());
        assert!(l2.get(key::derive_key(&q)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let l2 = Arc::new(L2Cache::open(None).unwrap());
        let cache = TwoTierCache::new(16, l2.clone());
        let q = query();
        cache.put(&q, response()).await.unwrap();

        cache.clear().await.unwrap();
        assert!(cache.get(&q).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn l2_hit_is_demoted_into_l1() {
        let l2 = Arc::new(L2Cache::open(None).unwrap());
        let cache = TwoTierCache::new(16, l2.clone());
        let q = query();
        l2.put(
            key::derive_key(&q),
            q.timeframe.code().to_string(),
            response(),
            std::time::Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert!(cache.get(&q).await.unwrap().is_some());
        assert!(cache.l1.get(&key::derive_key(&q)).is_some());
    }
}
