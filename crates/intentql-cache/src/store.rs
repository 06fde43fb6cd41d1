//! Generic bounded TTL cache.

use crate::key::content_hash;
use chrono::{DateTime, Utc};
use intentql_core::CacheSettings;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Size assumed for an entry whose value cannot be serialized.
const FALLBACK_ENTRY_SIZE: usize = 1024;

/// Share of entries evicted when a full cache takes a new key.
const EVICTION_FRACTION: usize = 5;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_access_at: DateTime<Utc>,
    /// Monotonic access order, breaks ties between equal timestamps.
    touched: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
    /// Approximate bytes held by keys and serialized values.
    pub memory_estimate: usize,
}

struct Store<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    clock: u64,
}

impl<V> Store<V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Bounded key/value cache with per-entry TTL and frequency/recency eviction.
///
/// Keys are any `Serialize` value, stored as their content hash. One mutex
/// guards the entries, the counters and eviction.
pub struct Cache<V> {
    store: Mutex<Store<V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<V: Clone + Serialize> Cache<V> {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                clock: 0,
            }),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.capacity, settings.ttl())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, Store<V>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `key`. Expired entries are removed and count as misses.
    pub fn get<K: Serialize + ?Sized>(&self, key: &K) -> Option<V> {
        let hashed = content_hash(key);
        let mut store = self.lock();
        let Some(hashed) = hashed else {
            store.misses += 1;
            return None;
        };
        lookup(&mut store, &hashed, Utc::now())
    }

    /// Look up `key`, computing and storing the value with the default TTL
    /// on a miss.
    ///
    /// `compute` runs without the lock held, so concurrent misses on the same
    /// key may each compute; the last one stored wins.
    pub fn get_or_compute<K, F>(&self, key: &K, compute: F) -> V
    where
        K: Serialize + ?Sized,
        F: FnOnce() -> V,
    {
        let Some(hashed) = content_hash(key) else {
            self.lock().misses += 1;
            return compute();
        };

        if let Some(value) = lookup(&mut self.lock(), &hashed, Utc::now()) {
            return value;
        }

        let value = compute();
        self.insert(hashed, value.clone(), self.default_ttl);
        value
    }

    /// Store `value` with the default TTL.
    pub fn set<K: Serialize + ?Sized>(&self, key: &K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store `value`, expiring `ttl` from now.
    pub fn set_with_ttl<K: Serialize + ?Sized>(&self, key: &K, value: V, ttl: Duration) {
        if let Some(hashed) = content_hash(key) {
            self.insert(hashed, value, ttl);
        }
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete<K: Serialize + ?Sized>(&self, key: &K) -> bool {
        match content_hash(key) {
            Some(hashed) => self.lock().entries.remove(&hashed).is_some(),
            None => false,
        }
    }

    /// Remove every entry and reset the counters.
    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.hits = 0;
        store.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.lock();
        let lookups = store.hits + store.misses;
        let memory_estimate = store
            .entries
            .iter()
            .map(|(key, entry)| {
                key.len()
                    + serde_json::to_vec(&entry.data)
                        .map(|bytes| bytes.len())
                        .unwrap_or(FALLBACK_ENTRY_SIZE)
            })
            .sum();

        CacheStats {
            size: store.entries.len(),
            hits: store.hits,
            misses: store.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                store.hits as f64 / lookups as f64
            },
            memory_estimate,
        }
    }

    fn insert(&self, hashed: String, value: V, ttl: Duration) {
        let now = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut store = self.lock();
        if !store.entries.contains_key(&hashed) && store.entries.len() >= self.capacity {
            evict(&mut store);
        }

        let touched = store.tick();
        store.entries.insert(
            hashed,
            CacheEntry {
                data: value,
                created_at: now,
                expires_at,
                access_count: 0,
                last_access_at: now,
                touched,
            },
        );
    }
}

fn lookup<V: Clone>(store: &mut Store<V>, hashed: &str, now: DateTime<Utc>) -> Option<V> {
    let expired = match store.entries.get(hashed) {
        None => {
            store.misses += 1;
            return None;
        }
        Some(entry) => entry.is_expired(now),
    };
    if expired {
        store.entries.remove(hashed);
        store.misses += 1;
        return None;
    }

    let touched = store.tick();
    store.hits += 1;
    let entry = store.entries.get_mut(hashed)?;
    entry.access_count += 1;
    entry.last_access_at = now;
    entry.touched = touched;
    Some(entry.data.clone())
}

/// Drop the lowest-ranked fifth (at least one) by access count, then recency.
fn evict<V>(store: &mut Store<V>) {
    let count = (store.entries.len() / EVICTION_FRACTION).max(1);

    let mut ranked: Vec<(u64, DateTime<Utc>, u64, String)> = store
        .entries
        .iter()
        .map(|(key, e)| (e.access_count, e.last_access_at, e.touched, key.clone()))
        .collect();
    ranked.sort();

    for (_, _, _, key) in ranked.into_iter().take(count) {
        store.entries.remove(&key);
    }
    tracing::debug!(evicted = count, remaining = store.entries.len(), "cache eviction");
}
