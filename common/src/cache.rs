use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL cache keyed by string.
///
/// Entries are created on write and evicted lazily: a read past the expiry
/// instant removes the entry and reports a miss. There is no background
/// sweep and no single-flight guard; concurrent misses on the same key may
/// each trigger their own upstream fetch.
pub struct Cache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: upgrade to a write lock and evict.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.value.clone());
            }
            debug!("cache: evicting expired key '{}'", key);
            entries.remove(key);
        }
        None
    }

    pub async fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Fetch and deserialize a cached JSON value. A value that no longer
    /// parses (e.g. after a schema change) is dropped and treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("cache: discarding unparsable entry '{}': {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, raw, ttl).await,
            Err(e) => warn!("cache: failed to serialize value for '{}': {}", key, e),
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn value_expires_after_ttl() {
        let cache = Cache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await, None);
        // The expired entry was evicted, not just hidden.
        assert!(cache.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = Cache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn json_round_trip_and_corrupt_entry() {
        let cache = Cache::new();
        cache
            .set_json("nums", &vec![1u32, 2, 3], Duration::from_secs(60))
            .await;
        assert_eq!(
            cache.get_json::<Vec<u32>>("nums").await,
            Some(vec![1, 2, 3])
        );

        cache
            .set("bad", "not json".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get_json::<Vec<u32>>("bad").await, None);
        assert_eq!(cache.get("bad").await, None);
    }
}
