// =============================================================================
// CacheStore — abstract TTL key-value store (Redis-compatible)
// =============================================================================
//
// `setex` also writes a long-lived `{key}:last_known` shadow entry so the
// stale-on-error path (§4.4) can read "the last value we ever had" without a
// second store.
// =============================================================================

pub mod in_memory;
pub mod redis_store;

use async_trait::async_trait;

pub const LAST_KNOWN_TTL_SECS: u64 = 24 * 60 * 60;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    /// Read the last-known value for `key`, regardless of whether the primary
    /// TTL has expired.
    async fn get_stale(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.get(&last_known_key(key)).await
    }

    /// Convenience wrapper: set both the primary TTL entry and the shadow
    /// last-known entry in one call.
    async fn setex_with_fallback(&self, key: &str, ttl_secs: u64, value: &str) -> anyhow::Result<()> {
        self.setex(key, ttl_secs, value).await?;
        self.setex(&last_known_key(key), LAST_KNOWN_TTL_SECS, value).await
    }
}

pub fn last_known_key(key: &str) -> String {
    format!("{key}:last_known")
}

pub use in_memory::InMemoryCacheStore;
pub use redis_store::RedisCacheStore;
