//! In-memory hash→bytes image cache shared between the capture path and the
//! scene agent, so screenshot bytes can be purged from the sliding window
//! once referenced.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

pub struct ImageCache {
    inner: Mutex<LruCache<String, Vec<u8>>>,
}

impl ImageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn put(&self, hash: String, bytes: Vec<u8>) {
        self.inner.lock().unwrap().put(hash, bytes);
    }

    pub fn get(&self, hash: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let cache = ImageCache::new(4);
        cache.put("h1".to_string(), vec![1, 2, 3]);
        assert_eq!(cache.get("h1"), Some(vec![1, 2, 3]));
        assert_eq!(cache.get("h2"), None);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = ImageCache::new(2);
        cache.put("a".to_string(), vec![1]);
        cache.put("b".to_string(), vec![2]);
        cache.get("a");
        cache.put("c".to_string(), vec![3]);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }
}
