//! TTL cache for resolution results.
//!
//! The mutex guards lookup, insert and eviction only. Values are computed
//! outside the lock, so two concurrent misses for one key may both compute;
//! the later insert wins. Failed computations are never stored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::catalog::ResolutionResult;
use crate::error::ConfigError;

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.max_entries == 0 {
            return Err(ConfigError::invalid(
                "cache.max_entries",
                "must be greater than zero when the cache is enabled",
            ));
        }
        if self.enabled && self.ttl_seconds == 0 {
            return Err(ConfigError::invalid(
                "cache.ttl_seconds",
                "must be greater than zero when the cache is enabled",
            ));
        }
        Ok(())
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// String-keyed cache with per-entry expiry and bounded size.
#[derive(Debug)]
pub struct TtlCache<V> {
    config: CacheConfig,
    entries: Mutex<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Cache keyed by the moniker string as requested.
pub type ResolutionCache = TtlCache<ResolutionResult>;

impl<V: Clone> TtlCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // A panic while holding the lock leaves the map consistent: every
    // mutation is a single insert or remove.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached value for `key`, or compute and store it.
    pub fn get_or_compute<E, F>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_compute_at(key, Instant::now(), compute)
    }

    /// As [`get_or_compute`](Self::get_or_compute), at an explicit instant.
    pub fn get_or_compute_at<E, F>(&self, key: &str, now: Instant, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if !self.config.enabled {
            return compute();
        }

        if let Some(value) = self.get_at(key, now) {
            return Ok(value);
        }

        let value = compute()?;
        self.insert_at(key, value.clone(), now);
        Ok(value)
    }

    /// Unexpired value for `key`, counting the hit or miss.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let found = {
            let entries = self.lock();
            entries
                .get(key)
                .filter(|e| now < e.expires_at)
                .map(|e| e.value.clone())
        };
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    fn insert_at(&self, key: &str, value: V, now: Instant) {
        let mut entries = self.lock();
        if entries.len() >= self.config.max_entries && !entries.contains_key(key) {
            let before = entries.len();
            entries.retain(|_, e| now < e.expires_at);
            let mut evicted = (before - entries.len()) as u64;

            while !entries.is_empty() && entries.len() >= self.config.max_entries {
                let earliest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                match earliest {
                    Some(k) => {
                        entries.remove(&k);
                        evicted += 1;
                    }
                    None => break,
                }
            }
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
        if entries.len() < self.config.max_entries || entries.contains_key(key) {
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: now + self.config.ttl(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;

    fn cache(max_entries: usize, ttl_seconds: u64) -> TtlCache<String> {
        TtlCache::new(CacheConfig {
            enabled: true,
            max_entries,
            ttl_seconds,
        })
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let c = cache(10, 60);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>("v".to_string())
        };
        assert_eq!(c.get_or_compute("k", compute).unwrap(), "v");
        assert_eq!(c.get_or_compute("k", compute).unwrap(), "v");
        assert_eq!(calls.get(), 1);

        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_expired_entry_recomputes() {
        let c = cache(10, 60);
        let t0 = Instant::now();
        c.get_or_compute_at("k", t0, || Ok::<_, ()>("old".to_string()))
            .unwrap();
        let before_expiry = c
            .get_or_compute_at("k", t0 + Duration::from_secs(59), || {
                Ok::<_, ()>("new".to_string())
            })
            .unwrap();
        assert_eq!(before_expiry, "old");
        let after_expiry = c
            .get_or_compute_at("k", t0 + Duration::from_secs(60), || {
                Ok::<_, ()>("new".to_string())
            })
            .unwrap();
        assert_eq!(after_expiry, "new");
    }

    #[test]
    fn test_errors_are_not_cached() {
        let c = cache(10, 60);
        let err = c.get_or_compute("k", || Err::<String, _>("boom"));
        assert_eq!(err, Err("boom"));
        assert!(c.is_empty());
        assert_eq!(
            c.get_or_compute("k", || Ok::<_, &str>("ok".to_string())),
            Ok("ok".to_string())
        );
    }

    #[test]
    fn test_capacity_evicts_earliest_expiry() {
        let c = cache(2, 60);
        let t0 = Instant::now();
        for (i, key) in ["a", "b"].iter().enumerate() {
            c.get_or_compute_at(key, t0 + Duration::from_secs(i as u64), || {
                Ok::<_, ()>(key.to_string())
            })
            .unwrap();
        }
        c.get_or_compute_at("c", t0 + Duration::from_secs(2), || Ok::<_, ()>("c".to_string()))
            .unwrap();

        assert_eq!(c.len(), 2);
        assert_eq!(c.stats().evictions, 1);
        let now = t0 + Duration::from_secs(3);
        assert!(c.get_at("a", now).is_none());
        assert!(c.get_at("b", now).is_some());
        assert!(c.get_at("c", now).is_some());
    }

    #[test]
    fn test_capacity_purges_expired_first() {
        let c = cache(2, 10);
        let t0 = Instant::now();
        c.get_or_compute_at("a", t0, || Ok::<_, ()>("a".into())).unwrap();
        c.get_or_compute_at("b", t0 + Duration::from_secs(5), || Ok::<_, ()>("b".into()))
            .unwrap();
        // "a" has expired by now; it goes and "b" stays
        c.get_or_compute_at("c", t0 + Duration::from_secs(11), || Ok::<_, ()>("c".into()))
            .unwrap();
        assert_eq!(c.len(), 2);
        assert!(c.get_at("b", t0 + Duration::from_secs(12)).is_some());
    }

    #[test]
    fn test_disabled_always_computes() {
        let c: TtlCache<String> = TtlCache::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let calls = Cell::new(0);
        for _ in 0..3 {
            c.get_or_compute("k", || {
                calls.set(calls.get() + 1);
                Ok::<_, ()>("v".to_string())
            })
            .unwrap();
        }
        assert_eq!(calls.get(), 3);
        assert!(c.is_empty());
    }

    #[test]
    fn test_clear_drops_entries() {
        let c = cache(10, 60);
        c.get_or_compute("k", || Ok::<_, ()>("v".to_string())).unwrap();
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let c = Arc::new(cache(10, 60));
        let c2 = Arc::clone(&c);
        let _ = std::thread::spawn(move || {
            let _guard = c2.entries.lock().unwrap();
            panic!("poison the cache lock");
        })
        .join();
        assert!(c.entries.is_poisoned());
        assert_eq!(
            c.get_or_compute("k", || Ok::<_, ()>("v".to_string())).unwrap(),
            "v"
        );
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default().validate().is_ok());
        let bad = CacheConfig {
            max_entries: 0,
            ..CacheConfig::default()
        };
        assert!(bad.validate().is_err());
        let disabled = CacheConfig {
            enabled: false,
            max_entries: 0,
            ttl_seconds: 0,
        };
        assert!(disabled.validate().is_ok());
    }
}
