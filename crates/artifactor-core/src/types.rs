use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a user (UUIDv7 — time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies an artifact (the unit of collaboration).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies a named handler dispatched to by the agent bridge
/// (e.g. `"PYGUI"`, `"COORDINATOR"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(name: &str) -> Self {
        Self(name.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cursor position inside an artifact's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

/// A text selection range inside an artifact's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

/// Presence status for a (user, artifact) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Active,
    Away,
    Offline,
}

/// Durable analog of a connected client's ephemeral state (§3 Presence record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub artifact_id: ArtifactId,
    pub status: PresenceStatus,
    pub activity: Option<String>,
    pub cursor: Option<CursorPosition>,
    pub viewport: Option<Value>,
    pub last_seen: DateTime<Utc>,
    pub session_id: ConnId,
    pub connection_info: Option<Value>,
}

impl PresenceRecord {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        (now - self.last_seen).num_seconds() >= ttl_secs
    }

    pub fn presence_key(&self) -> String {
        format!("{}:{}", self.user_id, self.artifact_id)
    }
}

/// A reply/discussion entry attached to an artifact (§3 Comment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub artifact_id: ArtifactId,
    pub author_id: UserId,
    pub parent_id: Option<String>,
    pub content: String,
    pub content_type: String,
    pub position_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub edited: bool,
    pub resolved: bool,
    pub resolved_by: Option<UserId>,
    #[serde(default)]
    pub reactions: HashMap<String, HashSet<String>>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

/// An append-only history event for an artifact (§3 Activity). Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub artifact_id: ArtifactId,
    pub user_id: UserId,
    pub activity_type: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub is_public: bool,
    pub related_comment_id: Option<String>,
    pub related_user_id: Option<UserId>,
}

/// Priority for a notification delivery (§3 Notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Mention,
    CommentReply,
    ArtifactUpdate,
    UserJoin,
    UserLeave,
    WorkspaceInvite,
    DeadlineReminder,
    SystemAlert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Websocket,
    Email,
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: UserId,
    pub artifact_id: Option<ArtifactId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub delivery_channels: Vec<DeliveryChannel>,
    #[serde(default)]
    pub delivered_channels: Vec<DeliveryChannel>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub related_comment_id: Option<String>,
    pub related_activity_id: Option<String>,
    pub related_user_id: Option<UserId>,
    #[serde(default)]
    pub data: Value,
}

impl Notification {
    pub fn is_urgent_class(&self) -> bool {
        matches!(
            self.priority,
            NotificationPriority::High | NotificationPriority::Urgent
        )
    }
}

/// Priority tier for a submitted inference request. Lower is higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum InferencePriority {
    High = 1,
    Medium = 2,
    Low = 3,
}

/// A transient request submitted to the inference pipeline (§3 Inference request).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub request_id: String,
    pub content: String,
    pub title: String,
    pub description: String,
    pub file_type: String,
    pub language: String,
    pub user_id: UserId,
    pub priority: InferencePriority,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationLabel {
    pub label: String,
    pub confidence: f32,
    #[serde(default)]
    pub alternatives: Vec<(String, f32)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub language: Option<ClassificationLabel>,
    pub content_type: Option<ClassificationLabel>,
    pub project_category: Option<ClassificationLabel>,
    pub quality: Option<ClassificationLabel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub confidence: f32,
    pub source: String,
}

/// The cacheable output of one inference pipeline run (§3 Inference result).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub request_id: String,
    pub success: bool,
    pub classification: Option<ClassificationResult>,
    pub tags: Vec<Tag>,
    pub embedding: Option<Vec<f32>>,
    pub quality_score: Option<f32>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
    pub cache_hit: bool,
    pub stages_completed: Vec<String>,
    pub produced_at: DateTime<Utc>,
    pub read_time_minutes: f32,
}

/// Per-distinct-query-shape database timing counters (§3 Query metrics).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub query_shape: String,
    pub executions: u64,
    pub total_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
}

impl QueryMetrics {
    pub fn average_time_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_time_ms / self.executions as f64
        }
    }

    pub fn record(&mut self, elapsed_ms: f64) {
        if self.executions == 0 {
            self.min_time_ms = elapsed_ms;
            self.max_time_ms = elapsed_ms;
        } else {
            self.min_time_ms = self.min_time_ms.min(elapsed_ms);
            self.max_time_ms = self.max_time_ms.max(elapsed_ms);
        }
        self.executions += 1;
        self.total_time_ms += elapsed_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_expires_after_ttl() {
        let now = Utc::now();
        let record = PresenceRecord {
            user_id: "u1".into(),
            artifact_id: "a1".into(),
            status: PresenceStatus::Active,
            activity: None,
            cursor: None,
            viewport: None,
            last_seen: now - chrono::Duration::seconds(301),
            session_id: ConnId::new(),
            connection_info: None,
        };
        assert!(record.is_expired(now, 300));
    }

    #[test]
    fn query_metrics_tracks_min_max_average() {
        let mut m = QueryMetrics::default();
        m.record(10.0);
        m.record(30.0);
        assert_eq!(m.executions, 2);
        assert_eq!(m.min_time_ms, 10.0);
        assert_eq!(m.max_time_ms, 30.0);
        assert_eq!(m.average_time_ms(), 20.0);
    }
}
