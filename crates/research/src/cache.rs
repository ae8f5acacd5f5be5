//! Time-bounded LRU memo of tool results.

use crate::types::ToolKind;
use delve_core::AppResult;
use lru::LruCache;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cache key: tool plus normalized query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tool: ToolKind,
    pub query: String,
}

impl CacheKey {
    pub fn new(tool: ToolKind, query: &str) -> Self {
        Self {
            tool,
            query: normalize_query(query),
        }
    }
}

/// Trim, lowercase and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

type FlightSlot = Arc<tokio::sync::Mutex<()>>;

/// Shared result cache with a fixed TTL and least-recently-used eviction.
///
/// Only successful results are stored. Concurrent misses on the same key
/// share one fetch: later callers wait for the first and read its result.
/// Callers on other keys never wait on a fetch.
#[derive(Debug)]
pub struct ResultCache<V> {
    entries: Mutex<LruCache<CacheKey, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<CacheKey, FlightSlot>>,
    /// Bumped by every invalidation; fetches started earlier are not stored
    generation: AtomicU64,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry<V>>> {
        // Entries are plain data; a panic elsewhere cannot leave them half-written
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live entry. Expired entries are removed and reported as a miss.
    pub fn get(&self, tool: ToolKind, query: &str) -> Option<V> {
        let key = CacheKey::new(tool, query);
        let mut entries = self.lock();

        let expired = match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(&key);
            tracing::debug!("Cache entry expired: {} '{}'", tool, key.query);
        }
        None
    }

    pub fn insert(&self, tool: ToolKind, query: &str, value: V) {
        self.lock().put(
            CacheKey::new(tool, query),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Return the cached value or run `fetch` and cache its success.
    ///
    /// The boolean is `true` when the value came from the cache. While one
    /// caller fetches a key, others asking for the same key wait and then
    /// read the cached value. If the fetch failed, the next waiter fetches
    /// itself.
    pub async fn get_or_fetch<F, Fut>(&self, tool: ToolKind, query: &str, fetch: F) -> AppResult<(V, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<V>>,
    {
        if let Some(value) = self.get(tool, query) {
            tracing::debug!("Cache hit: {} '{}'", tool, query);
            return Ok((value, true));
        }

        let key = CacheKey::new(tool, query);
        let slot = self.flight_slot(&key);
        let result = {
            let _flight = slot.lock().await;

            if let Some(value) = self.get(tool, query) {
                tracing::debug!("Cache hit after waiting: {} '{}'", tool, query);
                Ok((value, true))
            } else {
                let generation = self.generation.load(Ordering::Acquire);
                let fetched = fetch().await;
                if let Ok(value) = &fetched {
                    if self.generation.load(Ordering::Acquire) == generation {
                        self.insert(tool, query, value.clone());
                    } else {
                        tracing::debug!("Discarding result fetched before invalidation: {} '{}'", tool, query);
                    }
                }
                fetched.map(|value| (value, false))
            }
        };

        self.release_slot(&key, slot);
        result
    }

    fn flight_slot(&self, key: &CacheKey) -> FlightSlot {
        let mut slots = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Drop the slot of `key` when no other caller holds a clone of it.
    fn release_slot(&self, key: &CacheKey, slot: FlightSlot) {
        let mut slots = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let unused = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &slot) && Arc::strong_count(&slot) == 2);
        if unused {
            slots.remove(key);
        }
    }

    /// Drop every entry produced by `tool`.
    ///
    /// Fetches already running when this is called will not be stored.
    pub fn invalidate_tool(&self, tool: ToolKind) -> usize {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut entries = self.lock();
        let stale: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.tool == tool)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
