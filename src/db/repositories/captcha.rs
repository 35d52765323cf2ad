use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::cache::CacheRepository;
use super::error::RepoResult;
use crate::crypto::constant_time_eq;

const KEY_PREFIX: &str = "captcha:";

#[async_trait]
pub trait CaptchaRepository: Send + Sync {
    /// Stores a challenge, replacing any previous one with the same id.
    async fn create(&self, id: &str, code: &str, ttl: Duration) -> RepoResult<()>;

    /// True only on an exact match with a live challenge. The challenge is
    /// consumed by the attempt whatever the outcome, so an id can never
    /// verify twice.
    async fn verify(&self, id: &str, code: &str) -> RepoResult<bool>;
}

pub struct CacheCaptchaRepository {
    cache: Arc<dyn CacheRepository>,
}

impl CacheCaptchaRepository {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheRepository>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl CaptchaRepository for CacheCaptchaRepository {
    async fn create(&self, id: &str, code: &str, ttl: Duration) -> RepoResult<()> {
        self.cache
            .set(&format!("{KEY_PREFIX}{id}"), code.to_string(), ttl)
            .await
    }

    async fn verify(&self, id: &str, code: &str) -> RepoResult<bool> {
        let expected = self.cache.take(&format!("{KEY_PREFIX}{id}")).await?;
        Ok(expected.is_some_and(|expected| constant_time_eq(expected.as_bytes(), code.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::cache::MemoryCache;

    fn repo() -> CacheCaptchaRepository {
        CacheCaptchaRepository::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn test_verify_consumes_on_success() {
        let repo = repo();
        repo.create("id", "1234", Duration::from_secs(60)).await.unwrap();

        assert!(repo.verify("id", "1234").await.unwrap());
        assert!(!repo.verify("id", "1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_mismatch_also_consumes() {
        let repo = repo();
        repo.create("id", "1234", Duration::from_secs(60)).await.unwrap();

        assert!(!repo.verify("id", "0000").await.unwrap());
        assert!(!repo.verify("id", "1234").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_overwrites() {
        let repo = repo();
        repo.create("id", "1111", Duration::from_secs(60)).await.unwrap();
        repo.create("id", "2222", Duration::from_secs(60)).await.unwrap();

        assert!(repo.verify("id", "2222").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_challenge_fails() {
        let repo = repo();
        repo.create("id", "1234", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!repo.verify("id", "1234").await.unwrap());
    }
}
