// =============================================================================
// InMemoryCacheStore — local dev fallback and test double
// =============================================================================
//
// Used when `REDIS_URL` is unset, mirroring the teacher's own
// fall-back-to-default pattern in `RuntimeConfig::load`.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::CacheStore;

struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let entries = self.entries.lock();
        Ok(entries.get(key).filter(|e| e.expires_at > Instant::now()).map(|e| e.value.clone()))
    }

    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_within_ttl() {
        let store = InMemoryCacheStore::new();
        store.setex("k", 60, "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expires_after_ttl() {
        let store = InMemoryCacheStore::new();
        store.setex("k", 0, "v").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = InMemoryCacheStore::new();
        store.setex("k", 60, "v").await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_read_survives_primary_expiry() {
        let store = InMemoryCacheStore::new();
        store.setex_with_fallback("k", 0, "v").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get_stale("k").await.unwrap(), Some("v".to_string()));
    }
}
