//! Cache store trait — key/value with time-to-live.
//!
//! Values are opaque strings (the context assembler stores serialized
//! bundles). Backends report failures as [`CacheError`]; callers on the
//! request path wrap them so a failure reads as a miss.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::CacheError;

/// A stored value with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            created_at: Utc::now(),
            ttl_seconds,
        }
    }

    /// Expiry is strict: once `ttl_seconds` have elapsed the entry is gone.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_milliseconds() >= (self.ttl_seconds as i64).saturating_mul(1000)
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name (e.g., "memory", "sqlite", "none").
    fn name(&self) -> &str;

    /// Fetch a live value. Expired entries are a miss.
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError>;

    /// Store a value for `ttl_seconds`. Last write wins.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> std::result::Result<(), CacheError>;

    /// Remove a key. Returns whether it was present.
    async fn invalidate(&self, key: &str) -> std::result::Result<bool, CacheError>;

    /// Remove every entry. Returns how many live entries were removed.
    async fn clear(&self) -> std::result::Result<usize, CacheError>;
}
