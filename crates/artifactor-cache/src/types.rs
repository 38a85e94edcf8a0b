use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// A single cache entry (SPEC_FULL.md §3 Cache entry).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub ttl_secs: Option<u64>,
    pub size_bytes: usize,
    pub tags: HashSet<String>,
}

impl CacheEntry {
    pub fn new(key: String, value: serde_json::Value, ttl_secs: Option<u64>, tags: &[&str]) -> Self {
        let size_bytes = value.to_string().len();
        let now = Utc::now();
        Self {
            key,
            value,
            created_at: now,
            last_accessed_at: now,
            ttl_secs,
            size_bytes,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_secs {
            Some(ttl) => (now - self.created_at).num_seconds() >= ttl as i64,
            None => false,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }
}

/// Running stats exposed alongside the cache for the metrics collector.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sets: u64,
}
