//! Timeout-bounded, failure-absorbing cache wrapper.
//!
//! The cache is an optimization: a slow or unreachable backend must never
//! fail or stall a request. Every call is bounded by a timeout, and any
//! error or timeout is logged as `cache_unavailable` and reported as a miss
//! (for `get`) or a no-op (for `set` / `invalidate`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use voltwise_core::error::CacheError;
use voltwise_core::{CacheStore, FailureKind};

/// Counters since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

pub struct ResilientCache {
    inner: Arc<dyn CacheStore>,
    timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl ResilientCache {
    pub fn new(inner: Arc<dyn CacheStore>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached bundle. Used when the knowledge base is resynced.
    /// Returns how many live entries were removed.
    pub async fn invalidate_all(&self) -> usize {
        self.clear().await.unwrap_or(0)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Option<T> {
        let outcome = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind = %FailureKind::CacheUnavailable,
                    backend = self.inner.name(),
                    op,
                    error = %e,
                    "Cache call failed; continuing without cache"
                );
                None
            }
        }
    }
}

#[async_trait]
impl CacheStore for ResilientCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self.bounded("get", self.inner.get(key)).await.flatten();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache miss");
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        self.bounded("set", self.inner.set(key, value, ttl_seconds)).await;
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self
            .bounded("invalidate", self.inner.invalidate(key))
            .await
            .unwrap_or(false))
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        Ok(self.bounded("clear", self.inner.clear()).await.unwrap_or(0))
    }
}
