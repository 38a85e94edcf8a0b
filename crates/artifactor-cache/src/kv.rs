use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Tier-2 shared key-value backend. A real deployment would implement this
/// against a networked store; [`InMemoryKv`] is the fallback used whenever
/// `config.kv.url` is unset (SPEC_FULL.md §9A).
#[async_trait]
pub trait Tier2Kv: Send + Sync {
    async fn get(&self, key: &str) -> crate::error::Result<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value, ttl_secs: Option<u64>) -> crate::error::Result<()>;
    async fn delete(&self, key: &str) -> crate::error::Result<()>;
    async fn delete_by_tag(&self, tag: &str) -> crate::error::Result<()>;
    async fn set_tags(&self, key: &str, tags: &[&str]) -> crate::error::Result<()>;
}

struct Entry {
    value: serde_json::Value,
    created_at: DateTime<Utc>,
    ttl_secs: Option<u64>,
    tags: Vec<String>,
}

/// Process-local stand-in for the shared KV tier. Entries are not shared
/// across processes; this exists so the cache layer is functional without an
/// external dependency configured.
#[derive(Default)]
pub struct InMemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tier2Kv for InMemoryKv {
    async fn get(&self, key: &str) -> crate::error::Result<Option<serde_json::Value>> {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        let expired = entry
            .ttl_secs
            .map(|ttl| (Utc::now() - entry.created_at).num_seconds() >= ttl as i64)
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl_secs: Option<u64>) -> crate::error::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let tags = entries.get(key).map(|e| e.tags.clone()).unwrap_or_default();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                created_at: Utc::now(),
                ttl_secs,
                tags,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> crate::error::Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_by_tag(&self, tag: &str) -> crate::error::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|_, e| !e.tags.iter().any(|t| t == tag));
        Ok(())
    }

    async fn set_tags(&self, key: &str, tags: &[&str]) -> crate::error::Result<()> {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.tags = tags.iter().map(|t| t.to_string()).collect();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_kv_round_trips() {
        let kv = InMemoryKv::new();
        kv.set("k1", serde_json::json!(42), None).await.unwrap();
        assert_eq!(kv.get("k1").await.unwrap(), Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn delete_by_tag_removes_tagged_entries() {
        let kv = InMemoryKv::new();
        kv.set("k1", serde_json::json!(1), None).await.unwrap();
        kv.set_tags("k1", &["t1"]).await.unwrap();
        kv.delete_by_tag("t1").await.unwrap();
        assert_eq!(kv.get("k1").await.unwrap(), None);
    }
}
