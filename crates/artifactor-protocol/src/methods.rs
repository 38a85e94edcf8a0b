// HTTP route paths exposed by the collaboration hub (see SPEC_FULL.md §6).
// Kept as constants so the hub's router and any test client agree on one
// source of truth.

pub const WS_CONNECT: &str = "/ws";
pub const HEALTH: &str = "/health";

pub const ARTIFACT_COMMENTS: &str = "/artifacts/{id}/comments";
pub const ARTIFACT_COMMENT: &str = "/artifacts/{id}/comments/{cid}";
pub const ARTIFACT_ACTIVITY: &str = "/artifacts/{id}/activity";
pub const ARTIFACT_PRESENCE: &str = "/artifacts/{id}/presence";

pub const NOTIFICATIONS: &str = "/notifications";
pub const NOTIFICATIONS_MARK_READ: &str = "/notifications/mark-read";
pub const NOTIFICATIONS_MARK_ALL_READ: &str = "/notifications/mark-all-read";
pub const NOTIFICATIONS_COUNTS: &str = "/notifications/counts";

pub const ML_CLASSIFY: &str = "/ml/classify";
pub const ML_CLASSIFY_BATCH: &str = "/ml/classify/batch";
pub const ML_TAGS_GENERATE: &str = "/ml/tags/generate";
pub const ML_PROJECTS_ANALYZE: &str = "/ml/projects/analyze";
pub const ML_SEARCH: &str = "/ml/search";
pub const ML_RELATED: &str = "/ml/related";
