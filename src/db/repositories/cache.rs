//! Short-lived key/value state: CAPTCHA challenges and the refresh-token
//! revocation set.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::error::RepoResult;

#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    /// Inserts or overwrites.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> RepoResult<()>;

    /// Inserts only when no live entry exists. Returns whether it inserted.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> RepoResult<bool>;

    /// Atomically reads and removes a live entry.
    async fn take(&self, key: &str) -> RepoResult<Option<String>>;

    async fn delete(&self, key: &str) -> RepoResult<bool>;

    /// Drops expired entries, returning how many were removed.
    async fn purge_expired(&self) -> RepoResult<u64>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache. Each operation holds the lock for its whole
/// read-modify-write, which serializes mutations per key.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheRepository for MemoryCache {
    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> RepoResult<()> {
        let expires_at = Instant::now() + ttl;
        self.lock()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> RepoResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn take(&self, key: &str) -> RepoResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .remove(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> RepoResult<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    async fn purge_expired(&self) -> RepoResult<u64> {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_is_single_use() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.take("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.take("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.take("k").await.unwrap(), None);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(10);

        assert!(cache.set_if_absent("jti", "1".into(), ttl).await.unwrap());
        assert!(!cache.set_if_absent("jti", "2".into(), ttl).await.unwrap());
        assert_eq!(cache.get("jti").await.unwrap().as_deref(), Some("1"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.set_if_absent("jti", "3".into(), ttl).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("a", "1".into(), Duration::from_secs(1)).await.unwrap();
        cache.set("b", "2".into(), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
