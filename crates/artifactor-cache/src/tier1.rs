use crate::types::{CacheEntry, CacheStats};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-process LRU cache bounded by total byte size rather than entry count.
/// Eviction removes the least-recently-touched entries first, following the
/// Mutex-guarded map-plus-order-list idiom used throughout this workspace's
/// other caches.
pub struct Tier1 {
    capacity_bytes: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
    /// Recency order, oldest first. A key is moved to the back on every touch.
    order: Mutex<Vec<String>>,
    memory_usage: Mutex<usize>,
    stats: Mutex<CacheStats>,
}

impl Tier1 {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            memory_usage: Mutex::new(0),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let expired = match entries.get(key) {
            Some(e) => e.is_expired(now),
            None => {
                self.stats.lock().unwrap().misses += 1;
                return None;
            }
        };
        if expired {
            let entry = entries.remove(key).unwrap();
            *self.memory_usage.lock().unwrap() -= entry.size_bytes;
            self.order.lock().unwrap().retain(|k| k != key);
            self.stats.lock().unwrap().misses += 1;
            return None;
        }
        let entry = entries.get_mut(key).unwrap();
        entry.touch(now);
        let value = entry.value.clone();
        drop(entries);
        self.touch_order(key);
        self.stats.lock().unwrap().hits += 1;
        Some(value)
    }

    pub fn set(&self, key: String, value: serde_json::Value, ttl_secs: Option<u64>, tags: &[&str]) {
        let entry = CacheEntry::new(key.clone(), value, ttl_secs, tags);
        let size = entry.size_bytes;
        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(old) = entries.remove(&key) {
                *self.memory_usage.lock().unwrap() -= old.size_bytes;
            }
            entries.insert(key.clone(), entry);
        }
        *self.memory_usage.lock().unwrap() += size;
        self.touch_order(&key);
        self.stats.lock().unwrap().sets += 1;
        self.evict_to_capacity();
    }

    pub fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.remove(key) {
            *self.memory_usage.lock().unwrap() -= entry.size_bytes;
        }
        drop(entries);
        self.order.lock().unwrap().retain(|k| k != key);
    }

    pub fn delete_by_tag(&self, tag: &str) {
        let mut entries = self.entries.lock().unwrap();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.tags.contains(tag))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            if let Some(entry) = entries.remove(key) {
                *self.memory_usage.lock().unwrap() -= entry.size_bytes;
            }
        }
        drop(entries);
        let mut order = self.order.lock().unwrap();
        order.retain(|k| !doomed.contains(k));
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.order.lock().unwrap().clear();
        *self.memory_usage.lock().unwrap() = 0;
    }

    pub fn memory_usage(&self) -> usize {
        *self.memory_usage.lock().unwrap()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap().clone()
    }

    fn touch_order(&self, key: &str) {
        let mut order = self.order.lock().unwrap();
        order.retain(|k| k != key);
        order.push(key.to_string());
    }

    fn evict_to_capacity(&self) {
        loop {
            if self.memory_usage() <= self.capacity_bytes {
                break;
            }
            let oldest = {
                let mut order = self.order.lock().unwrap();
                if order.is_empty() {
                    break;
                }
                order.remove(0)
            };
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.remove(&oldest) {
                *self.memory_usage.lock().unwrap() -= entry.size_bytes;
                self.stats.lock().unwrap().evictions += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let t1 = Tier1::new(1024);
        t1.set("k1".into(), serde_json::json!({"a": 1}), None, &[]);
        assert_eq!(t1.get("k1"), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn expired_entry_is_absent_on_read() {
        let t1 = Tier1::new(1024);
        t1.set("k1".into(), serde_json::json!(1), Some(0), &[]);
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(t1.get("k1"), None);
    }

    #[test]
    fn delete_by_tag_removes_every_tagged_key() {
        let t1 = Tier1::new(1024);
        t1.set("k1".into(), serde_json::json!(1), None, &["group-a"]);
        t1.set("k2".into(), serde_json::json!(2), None, &["group-a"]);
        t1.set("k3".into(), serde_json::json!(3), None, &["group-b"]);
        t1.delete_by_tag("group-a");
        assert_eq!(t1.get("k1"), None);
        assert_eq!(t1.get("k2"), None);
        assert_eq!(t1.get("k3"), Some(serde_json::json!(3)));
    }

    #[test]
    fn eviction_keeps_memory_usage_under_capacity() {
        let t1 = Tier1::new(40);
        t1.set("k1".into(), serde_json::json!("aaaaaaaaaaaaaaaaaaaa"), None, &[]);
        t1.set("k2".into(), serde_json::json!("bbbbbbbbbbbbbbbbbbbb"), None, &[]);
        t1.set("k3".into(), serde_json::json!("cccccccccccccccccccc"), None, &[]);
        assert!(t1.memory_usage() <= 40);
        // k1 was least-recently-touched and should be the first evicted.
        assert_eq!(t1.get("k1"), None);
    }

    #[test]
    fn memory_usage_matches_sum_of_resident_sizes() {
        let t1 = Tier1::new(10_000);
        t1.set("k1".into(), serde_json::json!("hello"), None, &[]);
        t1.set("k2".into(), serde_json::json!("world"), None, &[]);
        let expected: usize = ["hello", "world"]
            .iter()
            .map(|s| serde_json::json!(s).to_string().len())
            .sum();
        assert_eq!(t1.memory_usage(), expected);
    }
}
