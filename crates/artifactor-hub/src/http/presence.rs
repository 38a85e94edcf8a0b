use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use artifactor_core::types::{ArtifactId, PresenceRecord};

use crate::app::HubState;

pub async fn artifact_presence(
    State(state): State<Arc<HubState>>,
    Path(artifact_id): Path<String>,
) -> Json<Vec<PresenceRecord>> {
    let records = state.presence.artifact_presence(&ArtifactId::from(artifact_id)).await;
    Json(records)
}
