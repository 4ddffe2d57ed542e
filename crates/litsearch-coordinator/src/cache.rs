//! Single-flight result cache with LRU eviction and TTL expiration.
//!
//! Concurrent requests for the same key share one computation: the first
//! caller computes without holding the lock, later callers wait on a
//! oneshot channel and receive the same result. A failure reaches every
//! waiter and leaves nothing behind, so the next request tries again.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::oneshot;
use tracing::debug;

use litsearch_core::config::CacheSettings;
use litsearch_core::error::{Error, Result};

type Waiter<V> = oneshot::Sender<Result<V>>;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

struct Flight<V> {
    id: u64,
    generation: u64,
    waiters: Vec<Waiter<V>>,
}

struct Inner<K: Hash + Eq, V> {
    ready: LruCache<K, CacheEntry<V>>,
    /// Keys being computed, with the callers waiting on them.
    loading: HashMap<K, Flight<V>>,
    /// Flights cut loose by `clear`, keyed by flight id. Their leaders still
    /// answer the waiters but never publish.
    detached: HashMap<u64, Vec<Waiter<V>>>,
    generation: u64,
    next_flight: u64,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq, V> Inner<K, V> {
    /// Ends flight `id` for `key`. Returns its waiters and whether it
    /// started in the current generation.
    fn finish(&mut self, key: &K, id: u64) -> (Vec<Waiter<V>>, bool) {
        if self.loading.get(key).is_some_and(|flight| flight.id == id) {
            if let Some(flight) = self.loading.remove(key) {
                return (flight.waiters, flight.generation == self.generation);
            }
        }
        (self.detached.remove(&id).unwrap_or_default(), false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub in_flight: usize,
}

pub struct ResultCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
}

/// Clears the loading slot if the computing caller goes away early, so
/// waiters see a cancellation instead of hanging.
struct LeaderGuard<'a, K: Hash + Eq, V> {
    cache: &'a ResultCache<K, V>,
    key: Option<K>,
    flight: u64,
}

impl<K: Hash + Eq, V> LeaderGuard<'_, K, V> {
    fn disarm(mut self) -> Option<K> {
        self.key.take()
    }
}

impl<K: Hash + Eq, V> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let _ = self.cache.lock().finish(&key, self.flight);
        }
    }
}

impl<K: Hash + Eq, V> ResultCache<K, V> {
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().ready.pop(key);
    }

    /// Drops every stored value. Computations already running still answer
    /// their callers, but their results are not stored, and later callers
    /// start a fresh computation instead of joining them.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.ready.clear();
        inner.generation += 1;
        let flights: Vec<Flight<V>> = inner.loading.drain().map(|(_, flight)| flight).collect();
        for flight in flights {
            inner.detached.insert(flight.id, flight.waiters);
        }
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone + Debug,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Result<Self> {
        let cap = NonZeroUsize::new(max_entries)
            .ok_or_else(|| Error::InvalidConfig("cache max_entries must be > 0".into()))?;
        Ok(Self {
            inner: Mutex::new(Inner {
                ready: LruCache::new(cap),
                loading: HashMap::new(),
                detached: HashMap::new(),
                generation: 0,
                next_flight: 0,
                hits: 0,
                misses: 0,
            }),
            ttl,
        })
    }

    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        Self::new(settings.max_entries, settings.ttl())
    }

    /// A fresh cached value, if any. Expired entries are dropped.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let fresh = match inner.ready.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                inner.ready.pop(key);
                None
            }
            None => None,
        };
        if fresh.is_some() {
            inner.hits += 1;
        }
        fresh
    }

    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        self.get_or_compute_if(key, |_| true, compute).await
    }

    /// Like [`ResultCache::get_or_compute`], but the computed value is only
    /// stored when `publish` accepts it. Waiters get it either way.
    pub async fn get_or_compute_if<P, F, Fut>(&self, key: K, publish: P, compute: F) -> Result<V>
    where
        P: FnOnce(&V) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let joined = {
            let mut inner = self.lock();
            // Another caller may have published while we were unlocked.
            if let Some(entry) = inner.ready.get(&key) {
                if entry.inserted_at.elapsed() < self.ttl {
                    let value = entry.value.clone();
                    inner.hits += 1;
                    return Ok(value);
                }
            }
            if let Some(flight) = inner.loading.get_mut(&key) {
                let (tx, rx) = oneshot::channel();
                flight.waiters.push(tx);
                Ok(rx)
            } else {
                inner.misses += 1;
                let id = inner.next_flight;
                inner.next_flight += 1;
                let generation = inner.generation;
                inner.loading.insert(key.clone(), Flight { id, generation, waiters: Vec::new() });
                Err(id)
            }
        };

        let flight = match joined {
            Ok(rx) => {
                return rx.await.map_err(|_| Error::Cancelled(format!("computation for {key:?} was dropped")))?;
            }
            Err(id) => id,
        };

        debug!(key = ?key, "cache miss");
        let guard = LeaderGuard { cache: self, key: Some(key), flight };
        let result = compute().await;
        let Some(key) = guard.disarm() else { return result };

        let mut inner = self.lock();
        let (waiters, current) = inner.finish(&key, flight);
        if let Ok(value) = &result {
            if !current {
                debug!(key = ?key, "cache cleared during computation, not storing");
            } else if publish(value) {
                inner.ready.put(key, CacheEntry { value: value.clone(), inserted_at: Instant::now() });
            } else {
                debug!(key = ?key, "computed value not cached");
            }
        }
        drop(inner);
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats { hits: inner.hits, misses: inner.misses, entries: inner.ready.len(), in_flight: inner.loading.len() }
    }
}
