//! TTL response cache
//!
//! Caches parsed JSON bodies of GET responses under `METHOD:URL` keys. The
//! whole entry map is mirrored into a [`DurableStore`] as one blob so cached
//! responses survive restarts.
//!
//! Entries are visible while `now <= expires_at`. Reading an expired entry
//! removes it; [`ResponseCache::open`] additionally sweeps everything already
//! expired. When the backing store runs out of space the cache drops every
//! entry instead of retrying the write.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::storage::DurableStore;

/// Durable key holding the serialized cache
pub const CACHE_STORAGE_KEY: &str = "lais_response_cache";

/// TTL used by [`ResponseCache::set`] (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Path fragments of endpoints whose responses hold private data
const PROTECTED_PATTERNS: &[&str] = &[
    "/auth/",
    "/posts/",
    "/profile",
    "/admin",
    "/reports",
    "/messages",
    "/chats",
];

/// Substrings that mark a key as user-specific regardless of path
const PROTECTED_SUBSTRINGS: &[&str] = &["user", "profile"];

/// A cached response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub expires_at: i64,
}

impl CacheEntry {
    fn is_live(&self, now: i64) -> bool {
        now <= self.expires_at
    }
}

/// TTL keyed cache persisted in a durable store
pub struct ResponseCache {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl ResponseCache {
    /// Load the cache from `store` and sweep expired entries
    pub async fn open(store: Arc<dyn DurableStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_default_ttl(store, clock, DEFAULT_TTL).await
    }

    /// Load the cache with a custom default TTL
    pub async fn with_default_ttl(
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
        default_ttl: Duration,
    ) -> Self {
        let entries = Self::load(store.as_ref()).await;
        let cache = Self {
            store,
            clock,
            entries: Mutex::new(entries),
            default_ttl,
        };

        let removed = cache.clean_expired().await;
        info!("Response cache ready ({} expired entries swept)", removed);
        cache
    }

    async fn load(store: &dyn DurableStore) -> HashMap<String, CacheEntry> {
        let blob = match store.get(CACHE_STORAGE_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                warn!("Failed to read response cache: {}", e);
                return HashMap::new();
            }
        };

        match serde_json::from_str::<Vec<CacheEntry>>(&blob) {
            Ok(list) => list.into_iter().map(|e| (e.key.clone(), e)).collect(),
            Err(e) => {
                warn!("Discarding unreadable response cache: {}", e);
                HashMap::new()
            }
        }
    }

    /// Get a live entry. Expired entries are removed and reported as absent.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now_millis();

        match entries.get(key) {
            None => None,
            Some(entry) if entry.is_live(now) => {
                debug!("Cache hit: {}", key);
                Some(entry.data.clone())
            }
            Some(_) => {
                debug!("Cache entry expired: {}", key);
                entries.remove(key);
                self.persist(&mut entries).await;
                None
            }
        }
    }

    /// Store `data` under `key` with the default TTL
    pub async fn set(&self, key: &str, data: Value) {
        self.set_with_ttl(key, data, self.default_ttl).await;
    }

    /// Store `data` under `key`, overwriting any previous entry
    pub async fn set_with_ttl(&self, key: &str, data: Value, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.clock.now_millis().saturating_add(ttl_millis);

        entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                data,
                expires_at,
            },
        );
        debug!("Cache set: {} (ttl {}s)", key, ttl.as_secs());
        self.persist(&mut entries).await;
    }

    /// Remove one entry
    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            debug!("Cache delete: {}", key);
            self.persist(&mut entries).await;
        }
    }

    /// Remove every entry
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.persist(&mut entries).await;
        info!("Response cache cleared");
    }

    /// Remove every entry holding private data, returning how many were removed.
    ///
    /// Called on logout so a shared device does not serve one user's
    /// responses to the next.
    pub async fn clear_user_data(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !is_protected_key(key));
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(&mut entries).await;
        }
        info!("Removed {} user-specific cache entries", removed);
        removed
    }

    /// Remove every expired entry, returning how many were removed
    pub async fn clean_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = self.clock.now_millis();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(&mut entries).await;
        }
        removed
    }

    /// Number of entries currently held, including ones not yet swept
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Mirror `entries` into the durable store.
    ///
    /// On quota exhaustion the cache is emptied and the write dropped.
    async fn persist(&self, entries: &mut HashMap<String, CacheEntry>) {
        let blob = match serde_json::to_string(&entries.values().collect::<Vec<_>>()) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to serialize response cache: {}", e);
                return;
            }
        };

        match self.store.set(CACHE_STORAGE_KEY, &blob).await {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                warn!("Storage full, clearing response cache: {}", e);
                entries.clear();
                if let Err(e) = self.store.remove(CACHE_STORAGE_KEY).await {
                    warn!("Failed to drop response cache blob: {}", e);
                }
            }
            Err(e) => warn!("Failed to persist response cache: {}", e),
        }
    }
}

/// Whether a cache key points at user-specific data
pub fn is_protected_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    PROTECTED_PATTERNS.iter().any(|p| key.contains(p))
        || PROTECTED_SUBSTRINGS.iter().any(|s| lowered.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use serde_json::json;

    async fn cache_at(start: i64) -> (ResponseCache, ManualClock, Arc<MemoryStore>) {
        let clock = ManualClock::new(start);
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::open(store.clone(), Arc::new(clock.clone())).await;
        (cache, clock, store)
    }

    #[tokio::test]
    async fn test_entry_visible_until_expiry_inclusive() {
        let (cache, clock, _) = cache_at(10_000).await;
        cache
            .set_with_ttl("GET:/api/v1/feed", json!({"n": 1}), Duration::from_millis(1_000))
            .await;

        clock.set(11_000);
        assert_eq!(cache.get("GET:/api/v1/feed").await, Some(json!({"n": 1})));

        clock.set(11_001);
        assert_eq!(cache.get("GET:/api/v1/feed").await, None);
        assert_eq!(cache.len().await, 0);

        // Second read after eviction is still a clean miss
        assert_eq!(cache.get("GET:/api/v1/feed").await, None);
    }

    #[tokio::test]
    async fn test_set_uses_default_ttl() {
        let (cache, clock, _) = cache_at(0).await;
        cache.set("GET:/a", json!(1)).await;

        clock.advance(DEFAULT_TTL);
        assert_eq!(cache.get("GET:/a").await, Some(json!(1)));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("GET:/a").await, None);
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_wrapping() {
        let (cache, clock, _) = cache_at(1_000).await;
        cache.set_with_ttl("GET:/a", json!(1), Duration::MAX).await;

        clock.set(i64::MAX);
        assert_eq!(cache.get("GET:/a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (cache, _, _) = cache_at(0).await;
        cache.set("GET:/a", json!(1)).await;
        cache.set("GET:/a", json!(2)).await;
        assert_eq!(cache.get("GET:/a").await, Some(json!(2)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (cache, _, _) = cache_at(0).await;
        cache.set("GET:/a", json!(1)).await;
        cache.set("GET:/b", json!(2)).await;

        cache.delete("GET:/a").await;
        assert_eq!(cache.get("GET:/a").await, None);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_user_data_keeps_public_entries() {
        let (cache, _, _) = cache_at(0).await;
        cache.set("GET:/api/v1/profile", json!(1)).await;
        cache.set("GET:/api/v1/feed", json!(2)).await;

        let removed = cache.clear_user_data().await;

        assert_eq!(removed, 1);
        assert_eq!(cache.get("GET:/api/v1/profile").await, None);
        assert_eq!(cache.get("GET:/api/v1/feed").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_clear_user_data_matches_every_protected_kind() {
        let (cache, _, _) = cache_at(0).await;
        for key in [
            "GET:/api/v1/auth/me",
            "GET:/api/v1/posts/iphone?id=7",
            "GET:/api/v1/admin/stats",
            "GET:/api/v1/reports",
            "GET:/api/v1/chat/chats/4/messages",
            "GET:/api/v1/UserSettings",
            "GET:/api/v1/catalog",
        ] {
            cache.set(key, json!(true)).await;
        }

        assert_eq!(cache.clear_user_data().await, 6);
        assert_eq!(cache.get("GET:/api/v1/catalog").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_open_sweeps_expired_and_keeps_live_entries() {
        let clock = ManualClock::new(0);
        let store = Arc::new(MemoryStore::new());
        {
            let cache = ResponseCache::open(store.clone(), Arc::new(clock.clone())).await;
            cache
                .set_with_ttl("GET:/short", json!(1), Duration::from_secs(1))
                .await;
            cache
                .set_with_ttl("GET:/long", json!(2), Duration::from_secs(60))
                .await;
        }

        clock.advance(Duration::from_secs(5));
        let reopened = ResponseCache::open(store, Arc::new(clock)).await;

        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.get("GET:/long").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_clears_cache() {
        let clock = ManualClock::new(0);
        let store = Arc::new(MemoryStore::with_quota(256));
        let cache = ResponseCache::open(store.clone(), Arc::new(clock)).await;

        cache.set("GET:/small", json!("ok")).await;
        assert_eq!(cache.len().await, 1);

        cache.set("GET:/big", json!("x".repeat(512))).await;

        assert!(cache.is_empty().await);
        assert_eq!(cache.get("GET:/small").await, None);
        assert!(store.get(CACHE_STORAGE_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_blob_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set(CACHE_STORAGE_KEY, "not json").await.unwrap();

        let cache = ResponseCache::open(store, Arc::new(ManualClock::new(0))).await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_protected_key_detection() {
        assert!(is_protected_key("GET:/api/v1/profile"));
        assert!(is_protected_key("GET:/api/v1/CurrentUser"));
        assert!(!is_protected_key("GET:/api/v1/feed"));
    }
}
