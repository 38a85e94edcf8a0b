use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use artifactor_core::types::{ArtifactId, Notification, UserId};

use crate::app::HubState;
use crate::auth::authenticate;
use crate::error::Result;

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub artifact_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let artifact_id = query.artifact_id.map(ArtifactId::from);
    let notifications = state.notifications.list(
        &UserId::from(user.user_id),
        query.limit,
        query.unread_only,
        artifact_id.as_ref(),
    )?;
    Ok(Json(notifications))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadBody {
    pub id: String,
}

pub async fn mark_read(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(body): Json<MarkReadBody>,
) -> Result<()> {
    let user = authenticate(&state.config.auth, &headers)?;
    state.notifications.mark_read(&body.id, &UserId::from(user.user_id))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct MarkAllReadQuery {
    #[serde(default)]
    pub artifact_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub marked: usize,
}

pub async fn mark_all_read(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Query(query): Query<MarkAllReadQuery>,
) -> Result<Json<MarkAllReadResponse>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let artifact_id = query.artifact_id.map(ArtifactId::from);
    let marked = state
        .notifications
        .mark_all_read(&UserId::from(user.user_id), artifact_id.as_ref())?;
    Ok(Json(MarkAllReadResponse { marked }))
}

#[derive(Debug, Serialize)]
pub struct CountsResponse {
    pub total: u64,
    pub unread: u64,
    pub urgent: u64,
}

pub async fn counts(State(state): State<Arc<HubState>>, headers: HeaderMap) -> Result<Json<CountsResponse>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let (total, unread, urgent) = state.notifications.counts(&UserId::from(user.user_id))?;
    Ok(Json(CountsResponse { total, unread, urgent }))
}
