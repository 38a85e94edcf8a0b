use crate::error::Result;
use crate::kv::Tier2Kv;
use crate::tier1::Tier1;
use crate::types::CacheStats;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Two-tier cache: an in-process LRU (Tier 1) in front of an optional shared
/// KV (Tier 2). Get consults Tier 1, then Tier 2; Set writes through both
/// (SPEC_FULL.md §4.3).
pub struct CacheLayer {
    tier1: Tier1,
    tier2: Option<Arc<dyn Tier2Kv>>,
    tier1_ttl_secs: u64,
    tier2_ttl_secs: u64,
}

impl CacheLayer {
    pub fn new(tier1_capacity_bytes: usize, tier1_ttl_secs: u64, tier2_ttl_secs: u64) -> Self {
        Self {
            tier1: Tier1::new(tier1_capacity_bytes),
            tier2: None,
            tier1_ttl_secs,
            tier2_ttl_secs,
        }
    }

    pub fn with_tier2(mut self, tier2: Arc<dyn Tier2Kv>) -> Self {
        self.tier2 = Some(tier2);
        self
    }

    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        if let Some(v) = self.tier1.get(key) {
            return Ok(Some(v));
        }
        if let Some(tier2) = &self.tier2 {
            if let Some(v) = tier2.get(key).await.map_err(|e| crate::error::CacheError::Storage(e.to_string()))? {
                self.tier1.set(key.to_string(), v.clone(), Some(self.tier1_ttl_secs), &[]);
                return Ok(Some(v));
            }
        }
        Ok(None)
    }

    pub async fn set(&self, key: &str, value: serde_json::Value, tags: &[&str]) -> Result<()> {
        self.tier1.set(key.to_string(), value.clone(), Some(self.tier1_ttl_secs), tags);
        if let Some(tier2) = &self.tier2 {
            tier2
                .set(key, value, Some(self.tier2_ttl_secs))
                .await
                .map_err(|e| crate::error::CacheError::Storage(e.to_string()))?;
            if !tags.is_empty() {
                tier2
                    .set_tags(key, tags)
                    .await
                    .map_err(|e| crate::error::CacheError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.tier1.delete(key);
        if let Some(tier2) = &self.tier2 {
            tier2
                .delete(key)
                .await
                .map_err(|e| crate::error::CacheError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn delete_by_tag(&self, tag: &str) -> Result<()> {
        self.tier1.delete_by_tag(tag);
        if let Some(tier2) = &self.tier2 {
            tier2
                .delete_by_tag(tag)
                .await
                .map_err(|e| crate::error::CacheError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.tier1.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.tier1.stats()
    }

    pub fn memory_usage(&self) -> usize {
        self.tier1.memory_usage()
    }

    /// Return the cached value for `key`, or compute it via `factory`, cache
    /// it, and return it. Not required to be exactly-once across concurrent
    /// callers (SPEC_FULL.md §4.3) — a duplicate compute under a race is
    /// acceptable; the last write wins.
    pub async fn get_or_set<F, Fut>(&self, key: &str, tags: &[&str], factory: F) -> Result<serde_json::Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value>>,
    {
        if let Some(v) = self.get(key).await? {
            return Ok(v);
        }
        let value = factory().await?;
        self.set(key, value.clone(), tags).await?;
        Ok(value)
    }
}

/// Spawns a background task that recomputes and sets `key` at a fixed
/// interval until `shutdown` fires.
pub fn warm_periodically<F, Fut>(
    cache: Arc<CacheLayer>,
    key: String,
    tags: Vec<String>,
    interval: Duration,
    shutdown: CancellationToken,
    mut factory: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<serde_json::Value>> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match factory().await {
                        Ok(value) => {
                            let tag_refs: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
                            if let Err(err) = cache.set(&key, value, &tag_refs).await {
                                tracing::warn!(key = %key, error = %err, "cache warm failed");
                            }
                        }
                        Err(err) => tracing::warn!(key = %key, error = %err, "cache warm factory failed"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryKv;

    #[tokio::test]
    async fn get_or_set_computes_once_on_miss() {
        let cache = CacheLayer::new(1024, 60, 60);
        let value = cache
            .get_or_set("k1", &[], || async { Ok(serde_json::json!(7)) })
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!(7));
        assert_eq!(cache.get("k1").await.unwrap(), Some(serde_json::json!(7)));
    }

    #[tokio::test]
    async fn tier2_backfills_tier1_on_miss() {
        let tier2 = Arc::new(InMemoryKv::new());
        tier2.set("k1", serde_json::json!("from-tier2"), None).await.unwrap();
        let cache = CacheLayer::new(1024, 60, 60).with_tier2(tier2);
        let value = cache.get("k1").await.unwrap();
        assert_eq!(value, Some(serde_json::json!("from-tier2")));
    }
}
