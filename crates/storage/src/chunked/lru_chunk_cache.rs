//! Small fixed-capacity LRU cache of decoded chunk contents, keyed by chunk
//! index. Capacity follows the chunked-handler minimum of 10 entries.

use litestore_core::limits::CHUNK_CACHE_CAPACITY;
use litestore_core::value::Value;
use std::collections::VecDeque;
use rustc_hash::FxHashMap;

pub struct LruChunkCache {
    capacity: usize,
    entries: FxHashMap<usize, Vec<Value>>,
    order: VecDeque<usize>,
}

impl LruChunkCache {
    pub fn new() -> Self {
        LruChunkCache {
            capacity: CHUNK_CACHE_CAPACITY,
            entries: FxHashMap::default(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, index: usize) -> Option<Vec<Value>> {
        if let Some(records) = self.entries.get(&index).cloned() {
            self.touch(index);
            Some(records)
        } else {
            None
        }
    }

    pub fn put(&mut self, index: usize, records: Vec<Value>) {
        if self.entries.insert(index, records).is_some() {
            self.touch(index);
            return;
        }
        self.order.push_back(index);
        if self.entries.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, index: usize) {
        if let Some(pos) = self.order.iter().position(|i| *i == index) {
            self.order.remove(pos);
        }
        self.order.push_back(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: i64) -> Vec<Value> {
        vec![Value::Int(id)]
    }

    #[test]
    fn get_miss_then_put_then_hit() {
        let mut cache = LruChunkCache::new();
        assert_eq!(cache.get(0), None);
        cache.put(0, v(0));
        assert_eq!(cache.get(0), Some(v(0)));
    }

    #[test]
    fn evicts_least_recently_used_beyond_capacity() {
        let mut cache = LruChunkCache::new();
        for i in 0..CHUNK_CACHE_CAPACITY {
            cache.put(i, v(i as i64));
        }
        cache.put(CHUNK_CACHE_CAPACITY, v(999));
        assert_eq!(cache.get(0), None);
        assert_eq!(cache.get(CHUNK_CACHE_CAPACITY), Some(v(999)));
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = LruChunkCache::new();
        cache.put(0, v(0));
        cache.clear();
        assert_eq!(cache.get(0), None);
    }
}
