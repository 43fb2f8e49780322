use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::memory::MemoryCache;
use super::redis::{CacheError, RedisCache};

const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
enum Backend {
    Redis(RedisCache),
    Memory(MemoryCache),
    Disabled,
}

/// Best-effort key/value cache.
///
/// Nothing here returns an error: a backend failure or a slow backend turns a
/// read into a miss and a write into a logged no-op.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
    op_timeout: Duration,
}

impl Cache {
    pub fn redis(cache: RedisCache) -> Self {
        Self::with_backend(Backend::Redis(cache))
    }

    pub fn memory(cache: MemoryCache) -> Self {
        Self::with_backend(Backend::Memory(cache))
    }

    pub fn disabled() -> Self {
        Self::with_backend(Backend::Disabled)
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
            Backend::Disabled => "disabled",
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let result = match &self.backend {
            Backend::Redis(redis) => self.bounded(redis.get(key)).await,
            Backend::Memory(memory) => self.bounded(async { Ok(memory.get(key).await) }).await,
            Backend::Disabled => Ok(None),
        };
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!("Cache read for {} failed, treating as miss: {}", key, err);
                None
            }
        }
    }

    /// Values come back in key order; failures read as all misses.
    pub async fn get_many(&self, keys: &[String]) -> Vec<Option<String>> {
        let result = match &self.backend {
            Backend::Redis(redis) => self.bounded(redis.get_many(keys)).await,
            Backend::Memory(memory) => self.bounded(async { Ok(memory.get_many(keys).await) }).await,
            Backend::Disabled => Ok(Vec::new()),
        };
        match result {
            Ok(values) if values.len() == keys.len() => values,
            Ok(_) => vec![None; keys.len()],
            Err(err) => {
                warn!("Cache read for {} keys failed, treating as misses: {}", keys.len(), err);
                vec![None; keys.len()]
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.set_many(&[(key.to_string(), value.to_string())], ttl).await;
    }

    pub async fn set_many(&self, entries: &[(String, String)], ttl: Duration) {
        if entries.is_empty() {
            return;
        }
        let result = match &self.backend {
            Backend::Redis(redis) => self.bounded(redis.set_many(entries, ttl)).await,
            Backend::Memory(memory) => self
                .bounded(async {
                    memory.set_many(entries, ttl).await;
                    Ok(())
                })
                .await,
            Backend::Disabled => Ok(()),
        };
        if let Err(err) = result {
            warn!("Cache write of {} entries skipped: {}", entries.len(), err);
        }
    }

    pub async fn delete(&self, key: &str) {
        let result = match &self.backend {
            Backend::Redis(redis) => self.bounded(redis.delete(key)).await,
            Backend::Memory(memory) => self
                .bounded(async {
                    memory.delete(key).await;
                    Ok(())
                })
                .await,
            Backend::Disabled => Ok(()),
        };
        if let Err(err) = result {
            warn!("Cache delete for {} skipped: {}", key, err);
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!("Ignoring undecodable cache entry {}: {}", key, err);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(err) => warn!("Failed to encode cache entry {}: {}", key, err),
        }
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        tokio::time::timeout(self.op_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        tickers: Vec<String>,
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = Cache::disabled();
        cache.set("k", "v", Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_many(&["k".into(), "j".into()]).await, vec![None, None]);
    }

    #[tokio::test]
    async fn stalled_backend_reads_as_a_miss_after_the_op_timeout() {
        let memory = MemoryCache::new();
        let cache = Cache::memory(memory.clone()).with_op_timeout(Duration::from_millis(50));
        cache.set("k", "v", Duration::from_secs(60)).await;

        let guard = memory.freeze().await;
        let started = std::time::Instant::now();
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_many(&["k".into()]).await, vec![None]);
        cache.set("k", "w", Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert!(started.elapsed() < Duration::from_secs(1));

        drop(guard);
        assert_eq!(cache.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn bounded_op_reports_the_timeout() {
        let cache = Cache::disabled().with_op_timeout(Duration::from_millis(20));
        let result = cache
            .bounded(std::future::pending::<Result<(), CacheError>>())
            .await;
        assert!(matches!(result, Err(CacheError::Timeout(d)) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn json_round_trip_through_memory_backend() {
        let cache = Cache::memory(MemoryCache::new());
        let snapshot = Snapshot {
            tickers: vec!["AAPL".into(), "MSFT".into()],
        };
        cache.set_json("snap", &snapshot, Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Snapshot>("snap").await, Some(snapshot));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let cache = Cache::memory(MemoryCache::new());
        cache.set("snap", "not json", Duration::from_secs(60)).await;
        assert_eq!(cache.get_json::<Snapshot>("snap").await, None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = Cache::memory(MemoryCache::new());
        cache.set("k", "v", Duration::from_secs(60)).await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }
}
