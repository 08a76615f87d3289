use async_trait::async_trait;

use crate::error::Result;

/// Key/value cache with per-entry TTL. Advisory only: callers treat every
/// error as a miss.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}
