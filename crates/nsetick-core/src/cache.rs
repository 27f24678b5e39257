//! Bounded in-memory caching gated by market state.
//!
//! Every logical operation owns its own [`CacheManager`]. Whether a computed
//! value may be cached is decided per call by an injected [`CachePolicy`];
//! while the market is open the manager neither reads nor stores, so callers
//! always see live data.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_used: AtomicU64,
}

/// Least-recently-used store with a fixed capacity.
///
/// Lookups only need a shared reference: recency is tracked with atomic
/// ticks so concurrent readers can share a read lock.
#[derive(Debug)]
pub struct LruStore<K, V> {
    slots: HashMap<K, Slot<V>>,
    capacity: usize,
    clock: AtomicU64,
}

impl<K, V> LruStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A store with capacity zero never retains anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity.min(1024)),
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns a clone of the cached value and marks it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let slot = self.slots.get(key)?;
        slot.last_used.store(self.tick(), Ordering::Relaxed);
        Some(slot.value.clone())
    }

    /// Stores `value`, evicting the least recently used entry when full.
    /// Returns the evicted key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        if self.capacity == 0 {
            return None;
        }

        let tick = self.tick();
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.value = value;
            slot.last_used.store(tick, Ordering::Relaxed);
            return None;
        }

        let evicted = if self.slots.len() >= self.capacity {
            self.least_recent()
        } else {
            None
        };
        if let Some(victim) = &evicted {
            self.slots.remove(victim);
        }

        self.slots.insert(
            key,
            Slot {
                value,
                last_used: AtomicU64::new(tick),
            },
        );
        evicted
    }

    fn least_recent(&self) -> Option<K> {
        self.slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone())
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.slots.remove(key).map(|slot| slot.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Decides, per call, whether results may be cached.
pub trait CachePolicy: Send + Sync {
    fn allows_caching<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Policy with a constant answer. Useful for tests and offline use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPolicy {
    allow: bool,
}

impl FixedPolicy {
    pub const fn always() -> Self {
        Self { allow: true }
    }

    pub const fn never() -> Self {
        Self { allow: false }
    }
}

impl CachePolicy for FixedPolicy {
    fn allows_caching<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let allow = self.allow;
        Box::pin(async move { allow })
    }
}

/// Named, bounded cache consulting its policy on every call.
pub struct CacheManager<K, V> {
    name: &'static str,
    store: RwLock<LruStore<K, V>>,
    policy: Arc<dyn CachePolicy>,
}

impl<K, V> CacheManager<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str, capacity: usize, policy: Arc<dyn CachePolicy>) -> Self {
        Self {
            name,
            store: RwLock::new(LruStore::new(capacity)),
            policy,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the cached value for `key`, or runs `compute`.
    ///
    /// When the policy disallows caching the store is neither read nor
    /// written. Errors from `compute` are returned and never stored.
    pub async fn get_or_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if !self.policy.allows_caching().await {
            debug!(cache = self.name, ?key, "cache bypassed");
            return compute().await;
        }

        if let Some(hit) = self.store.read().await.get(&key) {
            debug!(cache = self.name, ?key, "cache hit");
            return Ok(hit);
        }

        debug!(cache = self.name, ?key, "cache miss");
        let value = compute().await?;
        let evicted = self.store.write().await.insert(key, value.clone());
        if let Some(evicted) = evicted {
            debug!(cache = self.name, ?evicted, "cache evicted least recently used entry");
        }
        Ok(value)
    }

    /// Reads a cached value regardless of the policy.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.store.read().await.get(key)
    }

    pub async fn invalidate(&self, key: &K) -> Option<V> {
        self.store.write().await.remove(key)
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn capacity(&self) -> usize {
        self.store.read().await.capacity()
    }
}

impl<K, V> fmt::Debug for CacheManager<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
