//! In-memory cache backed by `DashMap`.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::cache::{Cache, CacheError, CacheOptions};

type EvictionHook<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Thread-safe in-memory cache with TTLs and a size bound.
///
/// Expired entries are invisible to reads immediately and are removed by
/// [`purge_expired`](Self::purge_expired) (run periodically by
/// [`spawn_cleanup`](Self::spawn_cleanup)). When full, inserting a new key
/// evicts the entry closest to expiry. Writes are serialized, so the size
/// bound holds under concurrent inserts.
pub struct MemoryCache<V> {
    entries: Arc<DashMap<String, Entry<V>>>,
    writes: Arc<Mutex<()>>,
    options: CacheOptions,
    on_evicted: Option<EvictionHook<V>>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            writes: Arc::clone(&self.writes),
            options: self.options.clone(),
            on_evicted: self.on_evicted.clone(),
        }
    }
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(options: CacheOptions) -> Result<Self, CacheError> {
        options.validate()?;
        Ok(Self {
            entries: Arc::new(DashMap::new()),
            writes: Arc::new(Mutex::new(())),
            options,
            on_evicted: None,
        })
    }

    /// Called with the prefixed key and value whenever an entry is deleted,
    /// expires, or is evicted for space. Not called on overwrite. The hook
    /// may run inside `set` and must not write to the cache.
    pub fn on_evicted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &V) + Send + Sync + 'static,
    {
        self.on_evicted = Some(Arc::new(hook));
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries, self.on_evicted.as_ref())
    }

    /// Run [`purge_expired`](Self::purge_expired) every cleanup interval
    /// until the cache is dropped.
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        let entries: Weak<DashMap<String, Entry<V>>> = Arc::downgrade(&self.entries);
        let hook = self.on_evicted.clone();
        let period = self.options.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else { break };
                let removed = purge(&entries, hook.as_ref());
                if removed > 0 {
                    tracing::debug!(removed, "Purged expired cache entries");
                }
            }
        })
    }

    fn expiry(&self, ttl: Duration) -> Option<Instant> {
        let ttl = if ttl.is_zero() { self.options.default_ttl } else { ttl };
        if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        }
    }

    fn evicted(&self, key: &str, value: &V) {
        if let Some(hook) = &self.on_evicted {
            hook(key, value);
        }
    }

    /// Make room for one more key.
    fn evict_for_insert(&self) {
        if self.purge_expired() > 0 && self.entries.len() < self.options.max_entries {
            return;
        }
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at.map_or((1, None), |at| (0, Some(at))))
            .map(|e| e.key().clone());

        if let Some(key) = victim {
            if let Some((key, entry)) = self.entries.remove(&key) {
                tracing::trace!(key = %key, "Evicted cache entry for space");
                self.evicted(&key, &entry.value);
            }
        }
    }
}

fn purge<V>(entries: &DashMap<String, Entry<V>>, hook: Option<&EvictionHook<V>>) -> usize {
    let now = Instant::now();
    let expired: Vec<String> = entries
        .iter()
        .filter(|e| e.value().is_expired(now))
        .map(|e| e.key().clone())
        .collect();

    let mut removed = 0;
    for key in expired {
        if let Some((key, entry)) = entries.remove_if(&key, |_, e| e.is_expired(now)) {
            removed += 1;
            if let Some(hook) = hook {
                hook(&key, &entry.value);
            }
        }
    }
    removed
}

impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str) -> Result<V, CacheError> {
        let key = self.options.build_key(key);
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired(now) {
                return Ok(entry.value.clone());
            }
        }

        if let Some((key, entry)) = self.entries.remove_if(&key, |_, e| e.is_expired(now)) {
            self.evicted(&key, &entry.value);
        }
        Err(CacheError::NotFound(key))
    }

    fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError> {
        let key = self.options.build_key(key);
        let _writes = self.writes.lock().expect("cache write mutex poisoned");
        if !self.entries.contains_key(&key) && self.entries.len() >= self.options.max_entries {
            self.evict_for_insert();
        }
        let expires_at = self.expiry(ttl);
        self.entries.insert(key, Entry { value, expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = self.options.build_key(key);
        if let Some((key, entry)) = self.entries.remove(&key) {
            self.evicted(&key, &entry.value);
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn cache() -> MemoryCache<String> {
        MemoryCache::new(CacheOptions::default()).unwrap()
    }

    #[test]
    fn set_get_delete() {
        let cache = cache();
        cache.set("a", "1".to_string(), Duration::ZERO).unwrap();
        assert_eq!(cache.get("a").unwrap(), "1");

        cache.delete("a").unwrap();
        assert_eq!(cache.get("a"), Err(CacheError::NotFound("a".into())));
        // Deleting a missing key is not an error.
        cache.delete("a").unwrap();
    }

    #[test]
    fn expired_entries_are_invisible() {
        let cache = cache();
        cache.set("short", "v".to_string(), Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert!(matches!(cache.get("short"), Err(CacheError::NotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_only_expired() {
        let cache = cache();
        cache.set("short", "v".to_string(), Duration::from_millis(10)).unwrap();
        cache.set("long", "v".to_string(), Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_ok());
    }

    #[test]
    fn prefix_is_applied() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let seen = evicted.clone();
        let options = CacheOptions { key_prefix: "svc".into(), ..CacheOptions::default() };
        let cache = MemoryCache::new(options)
            .unwrap()
            .on_evicted(move |key: &str, _: &String| seen.lock().unwrap().push(key.to_string()));

        cache.set("k", "v".to_string(), Duration::ZERO).unwrap();
        cache.delete("k").unwrap();
        assert_eq!(*evicted.lock().unwrap(), vec!["svc:k".to_string()]);
    }

    #[test]
    fn full_cache_evicts_soonest_expiry() {
        let options = CacheOptions { max_entries: 2, ..CacheOptions::default() };
        let cache = MemoryCache::new(options).unwrap();
        cache.set("soon", 1, Duration::from_secs(5)).unwrap();
        cache.set("later", 2, Duration::from_secs(500)).unwrap();
        cache.set("new", 3, Duration::from_secs(50)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("soon").is_err());
        assert_eq!(cache.get("later").unwrap(), 2);
        assert_eq!(cache.get("new").unwrap(), 3);

        // Overwriting an existing key never evicts.
        cache.set("new", 4, Duration::ZERO).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn multi_operations() {
        let cache = cache();
        let items: HashMap<String, String> =
            [("a", "1"), ("b", "2")].into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        cache.set_multi(items, Duration::ZERO).unwrap();

        let found = cache.get_multi(&["a", "b", "missing"]).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], "1");

        cache.delete_multi(&["a", "b"]).unwrap();
        assert!(cache.get_multi(&["a", "b"]).unwrap().is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = cache();
        cache.set("a", "1".to_string(), Duration::ZERO).unwrap();
        cache.set("b", "2".to_string(), Duration::ZERO).unwrap();
        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.kind(), "memory");
    }

    #[test]
    fn concurrent_inserts_respect_max_entries() {
        let options = CacheOptions { max_entries: 16, ..CacheOptions::default() };
        let cache: MemoryCache<usize> = MemoryCache::new(options).unwrap();

        std::thread::scope(|scope| {
            for t in 0..8 {
                let cache = cache.clone();
                scope.spawn(move || {
                    for i in 0..200 {
                        cache.set(&format!("{t}-{i}"), i, Duration::ZERO).unwrap();
                        assert!(cache.len() <= 16, "cache grew past its bound");
                    }
                });
            }
        });

        assert_eq!(cache.len(), 16);
    }

    #[tokio::test]
    async fn cleanup_task_purges_on_interval() {
        let options = CacheOptions { cleanup_interval: Duration::from_millis(20), ..CacheOptions::default() };
        let cache: MemoryCache<u32> = MemoryCache::new(options).unwrap();
        cache.set("gone", 1, Duration::from_millis(1)).unwrap();
        let task = cache.spawn_cleanup();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("cleanup task outlived the cache")
            .unwrap();
    }
}
