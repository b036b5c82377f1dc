//! Disabled cache: stores nothing, every lookup is a miss.

use async_trait::async_trait;
use voltwise_core::CacheStore;
use voltwise_core::error::CacheError;

pub struct DisabledCache;

#[async_trait]
impl CacheStore for DisabledCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _key: &str) -> Result<bool, CacheError> {
        Ok(false)
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_hits() {
        let cache = DisabledCache;
        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.invalidate("k").await.unwrap());
        assert_eq!(cache.clear().await.unwrap(), 0);
    }
}
