//! Bounded FIFO cache for search outcomes.
//!
//! Keys are derived from the normalized query text plus the detail level, so
//! `"TCA  Reducer"` and `"tca reducer"` share an entry. When full, the oldest
//! inserted entry is evicted; hits do not refresh position.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Collapse whitespace and lowercase.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable cache key: sha256 of `{scope}\n{normalized query}`.
pub fn cache_key(scope: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_query(query).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug)]
pub struct QueryCache<V> {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, V>,
}

impl<V: Clone> QueryCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Insert or replace. Replacing keeps the original insertion position.
    pub fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_queries_share_key() {
        assert_eq!(cache_key("details", "  TCA   Reducer "), cache_key("details", "tca reducer"));
        assert_ne!(cache_key("details", "tca"), cache_key("summary", "tca"));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = QueryCache::new(2);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.insert("c".to_string(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_replace_does_not_grow() {
        let mut cache = QueryCache::new(2);
        cache.insert("a".to_string(), 1);
        cache.insert("a".to_string(), 5);
        cache.insert("b".to_string(), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(5));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = QueryCache::new(0);
        cache.insert("a".to_string(), 1);
        assert!(cache.is_empty());
    }
}
