use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use artifactor_core::types::{Activity, ArtifactId};

use crate::app::HubState;
use crate::error::Result;

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Comma-separated `activity_type` filter, e.g. `?types=comment_add,artifact_edit`.
    #[serde(default)]
    pub types: Option<String>,
}

pub async fn list(
    State(state): State<Arc<HubState>>,
    Path(artifact_id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<Activity>>> {
    let types: Vec<String> = query
        .types
        .as_deref()
        .map(|s| s.split(',').filter(|t| !t.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let activity = state
        .hub
        .list_activity(&ArtifactId::from(artifact_id), query.limit, query.offset, &types)?;
    Ok(Json(activity))
}
