//! Caching infrastructure for decoded screenshots
//!
//! Decoding a full-resolution screenshot is the most expensive step before
//! recognition starts, and the same image is typically decoded several times
//! while the user adjusts the grid. Decoded images are kept in a small
//! bounded cache keyed by the source's content signature; the oldest entry is
//! dropped once the bound is reached.
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use stock_grid::cache::BoundedCache;
//!
//! let cache: BoundedCache<String, u32> = BoundedCache::with_capacity(2);
//! cache.insert("a".to_string(), 1);
//! assert_eq!(cache.get(&"a".to_string()), Some(1));
//! ```

use image::DynamicImage;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::PipelineMetrics;

/// Decoded images kept at most; a full screenshot is tens of megabytes
pub const DEFAULT_IMAGE_CAPACITY: usize = 8;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 before the first lookup
    pub hit_rate: f64,
}

struct Entries<K, V> {
    values: HashMap<K, V>,
    /// Insertion order, oldest first
    order: VecDeque<K>,
}

/// Thread-safe cache holding at most `capacity` entries, evicting the oldest insert
pub struct BoundedCache<K, V> {
    entries: Mutex<Entries<K, V>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// `capacity` is raised to 1 when 0
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                values: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.entries.lock().values.get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert or replace; returns the key evicted to make room, if any
    pub fn insert(&self, key: K, value: V) -> Option<K> {
        let mut entries = self.entries.lock();
        if entries.values.insert(key.clone(), value).is_some() {
            entries.order.retain(|k| k != &key);
        }
        entries.order.push_back(key);

        if entries.order.len() <= self.capacity {
            return None;
        }
        let oldest = entries.order.pop_front()?;
        entries.values.remove(&oldest);
        Some(oldest)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        let value = entries.values.remove(key)?;
        entries.order.retain(|k| k != key);
        Some(value)
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.values.clear();
        entries.order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Content signature of an image source: name, byte size and modification time.
///
/// Two sources with the same signature are assumed to decode to the same image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageSignature {
    pub name: String,
    pub size: u64,
    pub modified: Option<i64>,
}

impl std::fmt::Display for ImageSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.modified {
            Some(modified) => write!(f, "{}|{}|{}", self.name, self.size, modified),
            None => write!(f, "{}|{}|-", self.name, self.size),
        }
    }
}

/// Cache of decoded images keyed by [`ImageSignature`]
pub struct ImageCache {
    cache: BoundedCache<ImageSignature, Arc<DynamicImage>>,
    metrics: PipelineMetrics,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_IMAGE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: BoundedCache::with_capacity(capacity),
            metrics: PipelineMetrics::default(),
        }
    }

    /// Report hits and misses through `metrics`
    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Look up a decoded image, recording the hit or miss
    pub fn get(&self, signature: &ImageSignature) -> Option<Arc<DynamicImage>> {
        let found = self.cache.get(signature);
        self.metrics.record_image_cache(found.is_some());
        found
    }

    /// Store a decoded image
    pub fn insert(&self, signature: ImageSignature, image: Arc<DynamicImage>) {
        if let Some(evicted) = self.cache.insert(signature, image) {
            tracing::debug!(signature = %evicted, "Evicted oldest cached image");
        }
    }

    /// Evict one entry, returning whether it was present
    pub fn evict(&self, signature: &ImageSignature) -> bool {
        self.cache.remove(signature).is_some()
    }

    /// Evict everything
    pub fn clear(&self) {
        let count = self.cache.len();
        self.cache.clear();
        if count > 0 {
            tracing::info!("Cleared {count} cached images");
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}
