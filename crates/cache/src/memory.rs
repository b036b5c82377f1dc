//! In-process cache with LRU eviction and strict TTL expiry.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use voltwise_core::CacheStore;
use voltwise_core::error::CacheError;

struct Slot {
    value: String,
    stored_at: Instant,
    ttl: Duration,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// An LRU map guarded by a mutex. Expired entries are dropped on read.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, Slot>>,
}

impl InMemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(slot) if slot.is_live() => Ok(Some(slot.value.clone())),
            Some(_) => {
                entries.pop(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let slot = Slot {
            value: value.to_string(),
            stored_at: Instant::now(),
            ttl: Duration::from_secs(ttl_seconds),
        };
        self.entries.lock().await.put(key.to_string(), slot);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().await.pop(key).is_some())
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().await;
        let live = entries.iter().filter(|(_, slot)| slot.is_live()).count();
        entries.clear();
        Ok(live)
    }
}
