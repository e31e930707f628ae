//! Tag-aware TTL cache.
//!
//! A bounded in-process key/value store. Each entry carries its own time to
//! live and a set of tags so whole groups of entries (one operation class,
//! one patient) can be dropped without knowing their keys.
//!
//! Expiry is lazy: [`TtlCache::get`] deletes an entry it finds expired, and
//! [`TtlCache::set`] runs [`TtlCache::cleanup`] when the store is full. No
//! background task is needed for correctness.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use telecare_core::{Clock, SystemClock};

/// Default maximum number of entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at_ms: i64,
    ttl_ms: i64,
    tags: HashSet<String>,
}

impl<V> CacheEntry<V> {
    /// An entry is never served once `now - created_at > ttl`.
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.created_at_ms > self.ttl_ms
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, including expired reads.
    pub misses: u64,
    /// Entries removed by expiry or capacity pressure.
    pub evictions: u64,
    /// Number of entries currently stored (expired ones included until swept).
    pub entry_count: u64,
    /// Configured maximum number of entries.
    pub capacity: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of capacity in use (0.0 to 1.0).
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.entry_count as f64 / self.capacity as f64
        }
    }
}

/// Bounded TTL cache with tag and pattern invalidation.
///
/// Thread-safe; share it behind an `Arc`. A poisoned lock turns every
/// operation into a miss or a no-op rather than a panic.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries, on the system clock.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Store or overwrite `key`.
    ///
    /// When inserting a new key into a full store, expired entries are swept
    /// first; if that frees nothing the oldest entry is evicted.
    pub fn set<I, S>(&self, key: impl Into<String>, value: V, ttl: Duration, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let now = self.clock.now_millis();
        let entry = CacheEntry {
            value,
            created_at_ms: now,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            tags: tags.into_iter().map(Into::into).collect(),
        };

        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let swept = Self::sweep_expired(&mut entries, now);
            self.evictions.fetch_add(swept, Ordering::Relaxed);

            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.created_at_ms)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(evicted_key = %oldest, "Cache full, evicted oldest entry");
                }
            }
        }

        entries.insert(key, entry);
    }

    /// Fetch a fresh value, deleting the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();

        {
            let Ok(entries) = self.entries.read() else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };
            match entries.get(key) {
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        if let Ok(mut entries) = self.entries.write() {
            // Another writer may have refreshed the key since the read.
            let fresh = entries
                .get(key)
                .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
            match fresh {
                Some(Some(value)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Some(None) => {
                    entries.remove(key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Remove every entry tagged with `tag`. Returns the number removed.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        self.remove_where(|_, entry| entry.tags.contains(tag))
    }

    /// Remove every entry whose key matches `pattern`. Returns the number removed.
    pub fn invalidate_by_pattern(&self, pattern: &Regex) -> usize {
        self.remove_where(|key, _| pattern.is_match(key))
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let swept = Self::sweep_expired(&mut entries, now);
        self.evictions.fetch_add(swept, Ordering::Relaxed);
        swept as usize
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            capacity: self.capacity as u64,
        }
    }

    fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&str, &CacheEntry<V>) -> bool,
    {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key.as_str(), entry));
        before - entries.len()
    }

    fn sweep_expired(entries: &mut HashMap<String, CacheEntry<V>>, now_ms: i64) -> u64 {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now_ms));
        (before - entries.len()) as u64
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("capacity", &self.capacity)
            .field(
                "current_size",
                &self.entries.read().map(|e| e.len()).unwrap_or(0),
            )
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
