//! In-process L1 cache: a bounded LRU keyed by cache key, each entry
//! carrying its own expiry so a read can reject a stale hit without a
//! separate sweep pass.

use crate::models::DataResponse;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: DataResponse,
    expires_at: Instant,
}

pub struct L1Cache {
    inner: Mutex<LruCache<String, Entry>>,
}

impl L1Cache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached response if present and not yet expired. An
    /// expired entry is evicted on the read that discovers it.
    pub fn get(&self, key: &str) -> Option<DataResponse> {
        let mut inner = self.inner.lock().unwrap();
        let hit = inner.get(key).map(|entry| (entry.value.clone(), entry.expires_at));
        match hit {
            Some((value, expires_at)) if expires_at > Instant::now() => Some(value),
            Some(_) => {
                inner.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, value: DataResponse, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.lock().unwrap().pop(key);
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderInfo, ResponseMetadata};

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

    #[test]
    fn put_then_get_round_trips() {
        let cache = L1Cache::new(4);
        cache.put("k1".into(), response(), Duration::from_secs(60));
        assert!(cache.get("k1").is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = L1Cache::new(4);
        cache.put("k1".into(), response(), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = L1Cache::new(2);
        cache.put("k1".into(), response(), Duration::from_secs(60));
        cache.put("k2".into(), response(), Duration::from_secs(60));
        cache.get("k1");
        cache.put("k3".into(), response(), Duration::from_secs(60));
        assert!(cache.get("k2").is_none());
        assert!(cache.get("k1").is_some());
        assert!(cache.get("k3").is_some());
    }
}
