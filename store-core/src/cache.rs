//! Per-Processing-Worker bounded LRU.
//!
//! Generalizes the teacher's `TokenBlacklist` (an `Arc<RwLock<HashMap>>`
//! with a periodic cleanup task, see `jwt.rs`) from a revocation set
//! into a versioned, size-bounded, TTL-aware content cache.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

struct Entry {
    bytes: Vec<u8>,
    version: u64,
    created_at: Instant,
    /// `None` means "never expire by time" (LRU-only eviction).
    expiry: Option<Instant>,
    access_count: u64,
    last_accessed: Instant,
}

/// `hits`/`misses`/`evicts`/current `size` plus the configured `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evicts: u64,
    pub size: usize,
    pub max: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct CacheConfig {
    pub max_size: usize,
    /// `Duration::ZERO` means "never expire by time; LRU-only".
    pub default_ttl: Duration,
    pub cleanup_interval: Duration,
}

pub struct Cache {
    inner: Mutex<LruCache<String, Entry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evicts: AtomicU64,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_size.max(1)).expect("max_size >= 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            default_ttl: config.default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evicts: AtomicU64::new(0),
        }
    }

    fn is_expired(entry: &Entry, now: Instant) -> bool {
        matches!(entry.expiry, Some(expiry) if expiry <= now)
    }

    /// On hit, updates recency and access stats and returns
    /// `(bytes, version)`. Entries whose `expiry` is in the past are
    /// removed lazily on access.
    pub async fn get(&self, id: &str) -> Option<(Vec<u8>, u64)> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        if matches!(inner.peek(id), Some(entry) if Self::is_expired(entry, now)) {
            inner.pop(id);
        }

        match inner.get_mut(id) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some((entry.bytes.clone(), entry.version))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or overwrites `id`. Increments the eviction counter when
    /// capacity was already at `max_size` and a different entry had to
    /// be dropped to make room.
    pub async fn set(&self, id: &str, bytes: Vec<u8>, version: u64) {
        self.set_with_ttl(id, bytes, version, None).await
    }

    pub async fn set_with_ttl(&self, id: &str, bytes: Vec<u8>, version: u64, ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let expiry = if ttl.is_zero() { None } else { Some(now + ttl) };

        let entry = Entry {
            bytes,
            version,
            created_at: now,
            expiry,
            access_count: 0,
            last_accessed: now,
        };

        let mut inner = self.inner.lock().await;
        let already_has_key = inner.contains(id);
        if let Some((evicted_key, _)) = inner.push(id.to_string(), entry) {
            if evicted_key != id || !already_has_key {
                self.evicts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub async fn evict(&self, id: &str) {
        self.inner.lock().await.pop(id);
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Non-promoting existence check — does not affect recency order.
    pub async fn contains(&self, id: &str) -> bool {
        let inner = self.inner.lock().await;
        match inner.peek(id) {
            Some(entry) => !Self::is_expired(entry, Instant::now()),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.lock().await.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Overwrites the version of an existing entry without touching its
    /// bytes, recency, or expiry. Called on any read path that loads
    /// from storage, so the cache stays coherent with what was loaded.
    pub async fn update_version(&self, id: &str, version: u64) {
        if let Some(entry) = self.inner.lock().await.get_mut(id) {
            entry.version = version;
        }
    }

    pub async fn get_version(&self, id: &str) -> Option<u64> {
        self.inner.lock().await.peek(id).map(|e| e.version)
    }

    pub async fn resize(&self, new_size: usize) {
        let capacity = NonZeroUsize::new(new_size.max(1)).expect("new_size >= 1");
        self.inner.lock().await.resize(capacity);
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evicts: self.evicts.load(Ordering::Relaxed),
            size: inner.len(),
            max: inner.cap().get(),
        }
    }

    /// Removes every entry whose TTL has lapsed. Called by the
    /// background cleanup task and directly by tests.
    pub async fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .iter()
            .filter(|(_, entry)| Self::is_expired(entry, now))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = expired.len();
        for key in expired {
            inner.pop(&key);
        }
        removed
    }

    /// Creation timestamp of an entry, exposed for diagnostics/tests.
    #[cfg(test)]
    pub async fn created_at(&self, id: &str) -> Option<Instant> {
        self.inner.lock().await.peek(id).map(|e| e.created_at)
    }
}

/// Spawns a background task that periodically purges expired entries.
pub fn spawn_cleanup_task(cache: std::sync::Arc<Cache>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = cache.purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "cache cleanup removed expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_size: usize) -> CacheConfig {
        CacheConfig {
            max_size,
            default_ttl: Duration::ZERO,
            cleanup_interval: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = Cache::new(config(4));
        cache.set("e1", b"hello".to_vec(), 1).await;
        let (bytes, version) = cache.get("e1").await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn miss_increments_miss_counter() {
        let cache = Cache::new(config(4));
        assert!(cache.get("missing").await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_used() {
        let cache = Cache::new(config(3));
        cache.set("e1", b"1".to_vec(), 1).await;
        cache.set("e2", b"2".to_vec(), 1).await;
        cache.set("e3", b"3".to_vec(), 1).await;
        cache.set("e4", b"4".to_vec(), 1).await;

        assert_eq!(cache.len().await, 3);
        assert!(cache.get("e1").await.is_none());
        assert!(cache.get("e2").await.is_some());
        assert!(cache.get("e3").await.is_some());
        assert!(cache.get("e4").await.is_some());

        let stats = cache.stats().await;
        assert!(stats.evicts >= 1);
    }

    #[tokio::test]
    async fn ttl_expiry_is_lazy_on_access() {
        let cache = Cache::new(config(4));
        cache
            .set_with_ttl("e1", b"1".to_vec(), 1, Some(Duration::from_millis(10)))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("e1").await.is_none());
    }

    #[tokio::test]
    async fn update_version_preserves_bytes() {
        let cache = Cache::new(config(4));
        cache.set("e1", b"body".to_vec(), 1).await;
        cache.update_version("e1", 7).await;
        let (bytes, version) = cache.get("e1").await.unwrap();
        assert_eq!(bytes, b"body");
        assert_eq!(version, 7);
    }

    #[tokio::test]
    async fn contains_does_not_promote_recency() {
        let cache = Cache::new(config(2));
        cache.set("e1", b"1".to_vec(), 1).await;
        cache.set("e2", b"2".to_vec(), 1).await;
        assert!(cache.contains("e1").await);
        // e1 was only peeked, not promoted; e3 should evict e1, not e2.
        cache.set("e3", b"3".to_vec(), 1).await;
        assert!(cache.get("e1").await.is_none());
        assert!(cache.get("e2").await.is_some());
    }

    #[tokio::test]
    async fn purge_expired_removes_only_expired() {
        let cache = Cache::new(config(4));
        cache
            .set_with_ttl("e1", b"1".to_vec(), 1, Some(Duration::from_millis(10)))
            .await;
        cache.set("e2", b"2".to_vec(), 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let removed = cache.purge_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }
}
