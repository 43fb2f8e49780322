use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL map with the same string semantics as the redis backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let map = self.inner.read().await;
        map.get(key)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.value.clone())
    }

    pub async fn get_many(&self, keys: &[String]) -> Vec<Option<String>> {
        let map = self.inner.read().await;
        let now = Instant::now();
        keys.iter()
            .map(|key| {
                map.get(key)
                    .filter(|entry| now < entry.expires_at)
                    .map(|entry| entry.value.clone())
            })
            .collect()
    }

    pub async fn set_many(&self, entries: &[(String, String)], ttl: Duration) {
        let mut map = self.inner.write().await;
        let now = Instant::now();
        map.retain(|_, entry| entry.expires_at > now);

        let expires_at = now + ttl;
        for (key, value) in entries {
            map.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
    }

    pub async fn delete(&self, key: &str) {
        self.inner.write().await.remove(key);
    }

    /// Live (unexpired) entry count.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Hold the write lock so every other operation blocks until the guard drops.
    #[cfg(test)]
    pub(crate) async fn freeze(&self) -> tokio::sync::OwnedRwLockWriteGuard<HashMap<String, Entry>> {
        self.inner.clone().write_owned().await
    }
}
