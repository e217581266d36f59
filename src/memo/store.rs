//! Cache entries with ttl expiry and least-recently-used eviction.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::time::Instant;

use super::key::CacheKey;

// =============================================================================
// CacheEntry
// =============================================================================

/// A successfully produced value and its timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Creates an entry produced at `created_at`, expiring after `ttl`.
    ///
    /// A ttl reaching past the clock's range never expires.
    pub fn new(value: V, created_at: Instant, ttl: Option<Duration>) -> Self {
        Self {
            value,
            created_at,
            expires_at: ttl.and_then(|ttl| created_at.checked_add(ttl)),
        }
    }

    /// The cached value.
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// When the value was produced.
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the value expires, if ever.
    pub const fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Time elapsed since the value was produced.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// `true` once strictly more than the ttl has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

// =============================================================================
// CacheStats
// =============================================================================

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Calls answered from the cache.
    pub hits: u64,
    /// Calls that had to wait for the producer.
    pub misses: u64,
    /// Entries removed by expiry or size pressure.
    pub evictions: u64,
}

// =============================================================================
// CacheStore
// =============================================================================

/// Outcome of reading a key at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lookup<V> {
    /// A live entry of the given age.
    Fresh { value: V, age: Duration },
    /// An entry older than its ttl.
    Expired { value: V },
    Missing,
}

/// Key-indexed entries plus an explicit access-order list.
///
/// `order` runs from least to most recently used and always holds exactly
/// the keys of `entries`.
#[derive(Debug)]
pub(crate) struct CacheStore<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    order: VecDeque<CacheKey>,
    max_size: Option<NonZeroUsize>,
    stats: CacheStats,
}

impl<V> CacheStore<V> {
    pub(crate) fn new(max_size: Option<NonZeroUsize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size,
            stats: CacheStats::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) const fn stats(&self) -> CacheStats {
        self.stats
    }

    pub(crate) const fn record_hit(&mut self) {
        self.stats.hits += 1;
    }

    pub(crate) const fn record_miss(&mut self) {
        self.stats.misses += 1;
    }

    /// Reads an entry and marks it most recently used.
    pub(crate) fn get(&mut self, key: &str) -> Option<&CacheEntry<V>> {
        if self.entries.contains_key(key) {
            self.touch(key);
        }
        self.entries.get(key)
    }

    /// Reads the value held for `key`, live or expired, without touching
    /// recency.
    pub(crate) fn peek(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(CacheEntry::value)
    }

    /// Classifies the entry for `key` at `now`, marking it most recently used.
    pub(crate) fn lookup(&mut self, key: &str, now: Instant) -> Lookup<V>
    where
        V: Clone,
    {
        match self.get(key) {
            Some(entry) if entry.is_expired(now) => Lookup::Expired {
                value: entry.value.clone(),
            },
            Some(entry) => Lookup::Fresh {
                value: entry.value.clone(),
                age: entry.age(now),
            },
            None => Lookup::Missing,
        }
    }

    /// Stores an entry, evicting least recently used entries to stay within
    /// the size bound.
    pub(crate) fn insert(&mut self, key: CacheKey, entry: CacheEntry<V>) {
        if self.entries.insert(key.clone(), entry).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);

        if let Some(max_size) = self.max_size {
            while self.entries.len() > max_size.get() {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
                self.stats.evictions += 1;
                tracing::debug!(key = %oldest, "evicted least recently used entry");
            }
        }
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|candidate| candidate != key);
        Some(entry)
    }

    /// Removes an expired entry, counting it as an eviction.
    pub(crate) fn evict(&mut self, key: &str) {
        if self.remove(key).is_some() {
            self.stats.evictions += 1;
            tracing::debug!(key, "evicted expired entry");
        }
    }

    /// Removes every expired entry and returns how many were removed.
    pub(crate) fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let entries = &self.entries;
        self.order.retain(|key| entries.contains_key(key));

        let removed = before - self.entries.len();
        self.stats.evictions += removed as u64;
        if removed > 0 {
            tracing::debug!(removed, "swept expired entries");
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &str) {
        if let Some(position) = self.order.iter().position(|candidate| candidate == key) {
            if let Some(key) = self.order.remove(position) {
                self.order.push_back(key);
            }
        }
    }

    #[cfg(test)]
    fn order(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }
}
