//! Disk-backed L2 cache: a `cache_entries` table in the same embedded
//! DuckDB database the repository uses (schema grounded verbatim on the
//! original implementation's `database_schema.py`). Expiry is swept lazily
//! — a read past `expires_at` deletes the row instead of returning it, and
//! `cleanup_expired` reclaims rows nothing has touched recently.

use crate::error::CoreError;
use crate::models::DataResponse;
use chrono::Utc;
use duckdb::{params, Connection};
use std::sync::Mutex;
use std::time::Duration;

pub struct L2Cache {
    conn: Mutex<Connection>,
}

impl L2Cache {
    pub fn open(path: Option<&str>) -> Result<Self, CoreError> {
        let conn = match path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| CoreError::Storage {
            message: format!("opening cache database: {e}"),
        })?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                cache_key VARCHAR(32) PRIMARY KEY,
                data_type VARCHAR NOT NULL,
                data_json VARCHAR NOT NULL,
                expires_at BIGINT NOT NULL,
                created_at BIGINT NOT NULL,
                accessed_at BIGINT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);",
        )
        .map_err(|e| CoreError::Storage {
            message: format!("creating cache_entries table: {e}"),
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn get(self: &std::sync::Arc<Self>, key: String) -> Result<Option<DataResponse>, CoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.get_blocking(&key))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("l2 cache get task panicked: {e}"),
            })?
    }

    fn get_blocking(&self, key: &str) -> Result<Option<DataResponse>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT data_json, expires_at FROM cache_entries WHERE cache_key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();

        let Some((data_json, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at <= Utc::now().timestamp() {
            conn.execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key])
                .map_err(|e| CoreError::Storage {
                    message: format!("evicting expired cache entry: {e}"),
                })?;
            return Ok(None);
        }

        conn.execute(
            "UPDATE cache_entries SET accessed_at = ? WHERE cache_key = ?",
            params![Utc::now().timestamp(), key],
        )
        .ok();

        let response: DataResponse = serde_json::from_str(&data_json).map_err(|e| CoreError::Storage {
            message: format!("deserializing cached response: {e}"),
        })?;
        Ok(Some(response))
    }

    pub async fn put(
        self: &std::sync::Arc<Self>,
        key: String,
        data_type: String,
        value: DataResponse,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.put_blocking(&key, &data_type, &value, ttl))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("l2 cache put task panicked: {e}"),
            })?
    }

    fn put_blocking(
        &self,
        key: &str,
        data_type: &str,
        value: &DataResponse,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let data_json = serde_json::to_string(value).map_err(|e| CoreError::Storage {
            message: format!("serializing response for cache: {e}"),
        })?;
        let now = Utc::now().timestamp();
        let expires_at = now + ttl.as_secs() as i64;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
                (cache_key, data_type, data_json, expires_at, created_at, accessed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![key, data_type, data_json, expires_at, now, now],
        )
        .map_err(|e| CoreError::Storage {
            message: format!("writing cache entry: {e}"),
        })?;
        Ok(())
    }

    /// Delete one entry by key, regardless of expiry. No-op if absent.
    pub async fn delete(self: &std::sync::Arc<Self>, key: String) -> Result<(), CoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.delete_blocking(&key))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("l2 cache delete task panicked: {e}"),
            })?
    }

    fn delete_blocking(&self, key: &str) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cache_entries WHERE cache_key = ?", params![key])
            .map_err(|e| CoreError::Storage {
                message: format!("deleting cache entry: {e}"),
            })?;
        Ok(())
    }

    /// Delete every row. Used by a bulk cache clear.
    pub async fn clear(self: &std::sync::Arc<Self>) -> Result<(), CoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.clear_blocking())
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("l2 cache clear task panicked: {e}"),
            })?
    }

    fn clear_blocking(&self) -> Result<(), CoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cache_entries", params![])
            .map_err(|e| CoreError::Storage {
                message: format!("clearing cache entries: {e}"),
            })?;
        Ok(())
    }

    /// Delete every entry whose TTL has elapsed; returns the count removed.
    pub async fn cleanup_expired(self: &std::sync::Arc<Self>) -> Result<usize, CoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.cleanup_expired_blocking())
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("l2 cache cleanup task panicked: {e}"),
            })?
    }

    fn cleanup_expired_blocking(&self) -> Result<usize, CoreError> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?",
                params![Utc::now().timestamp()],
            )
            .map_err(|e| CoreError::Storage {
                message: format!("sweeping expired cache entries: {e}"),
            })?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderInfo, ResponseMetadata};
    use std::sync::Arc;

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
    async fn put_then_get_round_trips() {
        let cache = Arc::new(L2Cache::open(None).unwrap());
        cache
            .put("k1".into(), "ohlcv".into(), response(), Duration::from_secs(60))
            .await
            .unwrap();
        let got = cache.get("k1".into()).await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn expired_entry_returns_none_and_is_evicted() {
        let cache = Arc::new(L2Cache::open(None).unwrap());
        cache
            .put("k1".into(), "ohlcv".into(), response(), Duration::from_secs(0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let got = cache.get("k1".into()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn delete_removes_the_named_entry_only() {
        let cache = Arc::new(L2Cache::open(None).unwrap());
        cache
            .put("k1".into(), "ohlcv".into(), response(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put("k2".into(), "ohlcv".into(), response(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k1".into()).await.unwrap();
        assert!(cache.get("k1".into()).await.unwrap().is_none());
        assert!(cache.get("k2".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn clear_removes_every_entry() {
        let cache = Arc::new(L2Cache::open(None).unwrap());
        cache
            .put("k1".into(), "ohlcv".into(), response(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.clear().await.unwrap();
        assert!(cache.get("k1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_rows() {
        let cache = Arc::new(L2Cache::open(None).unwrap());
        cache
            .put("fresh".into(), "ohlcv".into(), response(), Duration::from_secs(3600))
            .await
            .unwrap();
        cache
            .put("stale".into(), "ohlcv".into(), response(), Duration::from_secs(0))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let removed = cache.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("fresh".into()).await.unwrap().is_some());
    }
}
