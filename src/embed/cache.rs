//! Bounded LRU cache for query embeddings.

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe LRU from query string to embedding.
///
/// The key is the SHA-256 hex digest of the raw UTF-8 query bytes; no
/// normalization is applied, so "Foo" and "foo" are distinct entries.
pub struct QueryCache {
    entries: Mutex<LruCache<String, Arc<Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a query, counting a hit or a miss.
    pub fn get(&self, query: &str) -> Option<Arc<Vec<f32>>> {
        let key = cache_key(query);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(vec) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vec.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an embedding, evicting the least recently used entry if full.
    pub fn put(&self, query: &str, embedding: Arc<Vec<f32>>) {
        let key = cache_key(query);
        self.entries.lock().put(key, embedding);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

fn cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let cache = QueryCache::new(4);
        assert!(cache.get("q").is_none());
        cache.put("q", Arc::new(vec![1.0, 2.0]));
        let got = cache.get("q").unwrap();
        assert_eq!(*got, vec![1.0, 2.0]);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert!((cache.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hit_rate_zero_when_untouched() {
        let cache = QueryCache::new(4);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = QueryCache::new(2);
        cache.put("a", Arc::new(vec![1.0]));
        cache.put("b", Arc::new(vec![2.0]));
        // Touch "a" so "b" becomes the eviction victim
        assert!(cache.get("a").is_some());
        cache.put("c", Arc::new(vec![3.0]));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_query_text_is_key_verbatim() {
        let cache = QueryCache::new(4);
        cache.put("Foo", Arc::new(vec![1.0]));
        assert!(cache.get("foo").is_none());
        assert!(cache.get("Foo ").is_none());
        assert!(cache.get("Foo").is_some());
    }
}
