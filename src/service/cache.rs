use std::any::Any;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use lru::LruCache;

use crate::engine::{self, MAX_CACHE_SIZE};
use crate::foundation::core::ServiceId;

/// A cached value. Clones share the payload, so a held item outlives its eviction.
#[derive(Clone)]
pub struct CacheItem {
    data: Arc<dyn Any + Send + Sync>,
    size: usize,
}

impl CacheItem {
    pub fn new<T: Any + Send + Sync>(data: T, size: usize) -> Self {
        Self {
            data: Arc::new(data),
            size,
        }
    }

    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Size hint supplied by the producer of the item.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl std::fmt::Debug for CacheItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheItem").field("size", &self.size).finish()
    }
}

type Registry = HashMap<String, LruCache<ServiceId, CacheItem>>;

fn registry() -> MutexGuard<'static, Registry> {
    static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

fn capacity(size: usize) -> NonZeroUsize {
    NonZeroUsize::new(size.clamp(1, MAX_CACHE_SIZE)).unwrap_or(NonZeroUsize::MIN)
}

fn named<'a>(reg: &'a mut Registry, name: &str) -> &'a mut LruCache<ServiceId, CacheItem> {
    reg.entry(name.to_string()).or_insert_with(|| {
        tracing::debug!(cache = name, "cache created");
        LruCache::new(capacity(engine::default_cache_size()))
    })
}

pub fn put(name: &str, owner: ServiceId, item: CacheItem) {
    let evicted = named(&mut registry(), name).push(owner, item);
    if let Some((id, _)) = evicted.filter(|(id, _)| *id != owner) {
        tracing::trace!(cache = name, evicted = %id, "cache eviction");
    }
}

pub fn get(name: &str, owner: ServiceId) -> Option<CacheItem> {
    registry().get_mut(name)?.get(&owner).cloned()
}

/// Resize a named cache, clamped to `1..=MAX_CACHE_SIZE`.
pub fn set_size(name: &str, size: usize) {
    let cap = capacity(size);
    // Evicted items may own services whose drop purges this registry.
    let evicted = {
        let mut reg = registry();
        let cache = named(&mut reg, name);
        let mut evicted = Vec::new();
        while cache.len() > cap.get() {
            match cache.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        cache.resize(cap);
        evicted
    };
    if !evicted.is_empty() {
        tracing::trace!(cache = name, evicted = evicted.len(), "cache shrunk");
    }
    drop(evicted);
}

pub fn get_size(name: &str) -> usize {
    registry()
        .get(name)
        .map_or_else(engine::default_cache_size, |c| c.cap().get())
}

/// Remove every item owned by `owner` from every named cache.
pub fn purge(owner: ServiceId) {
    let removed: Vec<CacheItem> = registry()
        .values_mut()
        .filter_map(|c| c.pop(&owner))
        .collect();
    drop(removed);
}

pub(crate) fn clear_all() {
    let caches = std::mem::take(&mut *registry());
    drop(caches);
}

#[cfg(test)]
#[path = "../../tests/unit/service/cache.rs"]
mod tests;
