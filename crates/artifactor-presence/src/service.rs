use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use artifactor_cache::CacheLayer;
use artifactor_core::types::{ArtifactId, ConnId, CursorPosition, PresenceRecord, PresenceStatus, UserId};

use crate::error::Result;
use crate::store;

/// Records older than this are reaped by the background cleanup task
/// (spec.md §4.4).
pub const PRESENCE_TTL_SECS: i64 = 300;

/// Tracks where users are and what they are doing. Writes go through an
/// in-memory index, an optional shared KV (via [`CacheLayer`]), and a durable
/// store kept for analytics only (spec.md §4.4).
pub struct PresenceService {
    durable: Arc<Mutex<Connection>>,
    cache: Arc<CacheLayer>,
    memory: Mutex<HashMap<String, PresenceRecord>>,
    by_artifact: Mutex<HashMap<ArtifactId, HashSet<String>>>,
    by_user: Mutex<HashMap<UserId, HashSet<String>>>,
}

impl PresenceService {
    pub fn new(durable: Arc<Mutex<Connection>>, cache: Arc<CacheLayer>) -> Result<Self> {
        store::init_db(&durable.lock().unwrap())?;
        Ok(Self {
            durable,
            cache,
            memory: Mutex::new(HashMap::new()),
            by_artifact: Mutex::new(HashMap::new()),
            by_user: Mutex::new(HashMap::new()),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_presence(
        &self,
        user_id: UserId,
        artifact_id: ArtifactId,
        status: PresenceStatus,
        activity: Option<String>,
        cursor: Option<CursorPosition>,
        viewport: Option<Value>,
        session_id: ConnId,
        connection_info: Option<Value>,
    ) -> Result<PresenceRecord> {
        let record = PresenceRecord {
            user_id,
            artifact_id,
            status,
            activity,
            cursor,
            viewport,
            last_seen: Utc::now(),
            session_id,
            connection_info,
        };
        self.write_through(&record).await?;
        Ok(record)
    }

    pub async fn update_cursor(
        &self,
        user_id: &UserId,
        artifact_id: &ArtifactId,
        cursor: CursorPosition,
    ) -> Result<Option<PresenceRecord>> {
        let Some(mut record) = self.get(user_id, artifact_id) else {
            return Ok(None);
        };
        record.cursor = Some(cursor);
        record.last_seen = Utc::now();
        self.write_through(&record).await?;
        Ok(Some(record))
    }

    pub async fn update_activity(
        &self,
        user_id: &UserId,
        artifact_id: &ArtifactId,
        activity: String,
    ) -> Result<Option<PresenceRecord>> {
        let Some(mut record) = self.get(user_id, artifact_id) else {
            return Ok(None);
        };
        record.activity = Some(activity);
        record.last_seen = Utc::now();
        self.write_through(&record).await?;
        Ok(Some(record))
    }

    pub async fn remove_presence(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Result<()> {
        let key = presence_key(user_id, artifact_id);
        self.memory.lock().unwrap().remove(&key);
        self.unindex(user_id, artifact_id, &key);

        if let Err(err) = self.cache.delete(&key).await {
            warn!(key = %key, error = %err, "presence KV delete failed");
        }

        let conn = self.durable.lock().unwrap();
        store::mark_offline(&conn, user_id, artifact_id, Utc::now())?;
        Ok(())
    }

    /// Union of matching records from the in-memory index and the KV tier,
    /// deduplicated by user id; only `active`/`away` records are included.
    pub async fn artifact_presence(&self, artifact_id: &ArtifactId) -> Vec<PresenceRecord> {
        let keys: Vec<String> = self
            .by_artifact
            .lock()
            .unwrap()
            .get(artifact_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        self.resolve_keys(keys).await
    }

    pub async fn user_presence(&self, user_id: &UserId) -> Vec<PresenceRecord> {
        let keys: Vec<String> = self
            .by_user
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        self.resolve_keys(keys).await
    }

    async fn resolve_keys(&self, keys: Vec<String>) -> Vec<PresenceRecord> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let cached = self.cache.get(&key).await.ok().flatten();
            let record = match cached.and_then(|v| serde_json::from_value::<PresenceRecord>(v).ok()) {
                Some(r) => Some(r),
                None => self.memory.lock().unwrap().get(&key).cloned(),
            };
            if let Some(record) = record {
                if !matches!(record.status, PresenceStatus::Offline) {
                    out.push(record);
                }
            }
        }
        out
    }

    fn get(&self, user_id: &UserId, artifact_id: &ArtifactId) -> Option<PresenceRecord> {
        self.memory
            .lock()
            .unwrap()
            .get(&presence_key(user_id, artifact_id))
            .cloned()
    }

    async fn write_through(&self, record: &PresenceRecord) -> Result<()> {
        let key = record.presence_key();
        self.memory.lock().unwrap().insert(key.clone(), record.clone());
        self.index(&record.user_id, &record.artifact_id, &key);

        let value = serde_json::to_value(record).unwrap_or(Value::Null);
        if let Err(err) = self.cache.set(&key, value, &[record.artifact_id.as_str()]).await {
            warn!(key = %key, error = %err, "presence KV write-through failed");
        }

        let conn = self.durable.lock().unwrap();
        store::upsert(&conn, record)?;
        Ok(())
    }

    fn index(&self, user_id: &UserId, artifact_id: &ArtifactId, key: &str) {
        self.by_artifact
            .lock()
            .unwrap()
            .entry(artifact_id.clone())
            .or_default()
            .insert(key.to_string());
        self.by_user
            .lock()
            .unwrap()
            .entry(user_id.clone())
            .or_default()
            .insert(key.to_string());
    }

    fn unindex(&self, user_id: &UserId, artifact_id: &ArtifactId, key: &str) {
        if let Some(set) = self.by_artifact.lock().unwrap().get_mut(artifact_id) {
            set.remove(key);
        }
        if let Some(set) = self.by_user.lock().unwrap().get_mut(user_id) {
            set.remove(key);
        }
    }

    /// Reap records whose `last_seen` predates [`PRESENCE_TTL_SECS`]: dropped
    /// from memory and marked offline in the durable store. Runs at minute
    /// granularity (spec.md §4.4).
    pub fn run_cleanup(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.sweep_expired(),
                }
            }
        })
    }

    fn sweep_expired(&self) {
        let now = Utc::now();
        let expired: Vec<(UserId, ArtifactId, String)> = self
            .memory
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.is_expired(now, PRESENCE_TTL_SECS))
            .map(|(k, r)| (r.user_id.clone(), r.artifact_id.clone(), k.clone()))
            .collect();

        if expired.is_empty() {
            return;
        }
        info!(count = expired.len(), "sweeping expired presence records");

        let conn = self.durable.lock().unwrap();
        for (user_id, artifact_id, key) in expired {
            self.memory.lock().unwrap().remove(&key);
            self.unindex(&user_id, &artifact_id, &key);
            if let Err(err) = store::mark_offline(&conn, &user_id, &artifact_id, now) {
                warn!(key = %key, error = %err, "failed to mark expired presence offline");
            }
        }
    }
}

fn presence_key(user_id: &UserId, artifact_id: &ArtifactId) -> String {
    format!("{user_id}:{artifact_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> PresenceService {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let cache = Arc::new(CacheLayer::new(1024 * 1024, 300, 300));
        PresenceService::new(conn, cache).unwrap()
    }

    #[tokio::test]
    async fn update_then_artifact_presence_returns_active_record() {
        let svc = service();
        let user = UserId::new();
        let artifact = ArtifactId::from("a1");
        svc.update_presence(
            user.clone(),
            artifact.clone(),
            PresenceStatus::Active,
            Some("editing".into()),
            None,
            None,
            ConnId::new(),
            None,
        )
        .await
        .unwrap();

        let present = svc.artifact_presence(&artifact).await;
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].user_id, user);
    }

    #[tokio::test]
    async fn remove_presence_excludes_from_artifact_presence() {
        let svc = service();
        let user = UserId::new();
        let artifact = ArtifactId::from("a1");
        svc.update_presence(
            user.clone(),
            artifact.clone(),
            PresenceStatus::Active,
            None,
            None,
            None,
            ConnId::new(),
            None,
        )
        .await
        .unwrap();
        svc.remove_presence(&user, &artifact).await.unwrap();
        assert!(svc.artifact_presence(&artifact).await.is_empty());
    }

    #[tokio::test]
    async fn update_cursor_refreshes_last_seen_and_cursor() {
        let svc = service();
        let user = UserId::new();
        let artifact = ArtifactId::from("a1");
        svc.update_presence(
            user.clone(),
            artifact.clone(),
            PresenceStatus::Active,
            None,
            None,
            None,
            ConnId::new(),
            None,
        )
        .await
        .unwrap();
        let updated = svc
            .update_cursor(&user, &artifact, CursorPosition { line: 4, column: 2 })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.cursor, Some(CursorPosition { line: 4, column: 2 }));
    }

    #[tokio::test]
    async fn user_presence_is_symmetric_across_artifacts() {
        let svc = service();
        let user = UserId::new();
        for artifact in ["a1", "a2"] {
            svc.update_presence(
                user.clone(),
                ArtifactId::from(artifact),
                PresenceStatus::Active,
                None,
                None,
                None,
                ConnId::new(),
                None,
            )
            .await
            .unwrap();
        }
        assert_eq!(svc.user_presence(&user).await.len(), 2);
    }
}
