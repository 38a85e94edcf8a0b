use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use artifactor_core::types::{ArtifactId, Comment, UserId};

use crate::app::HubState;
use crate::auth::authenticate;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct CreateCommentBody {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub position_data: Option<Value>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

fn default_content_type() -> String {
    "text".to_string()
}

pub async fn create(
    State(state): State<Arc<HubState>>,
    Path(artifact_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateCommentBody>,
) -> Result<Json<Comment>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let artifact_id = ArtifactId::from(artifact_id);
    let data = serde_json::json!({
        "content": body.content,
        "parent_id": body.parent_id,
        "content_type": body.content_type,
        "position_data": body.position_data,
        "mentions": body.mentions,
    });
    let comment = state
        .hub
        .submit_comment(&artifact_id, &UserId::from(user.user_id), &user.display_name, data)
        .await?;
    Ok(Json(comment))
}

pub async fn list(
    State(state): State<Arc<HubState>>,
    Path(artifact_id): Path<String>,
) -> Result<Json<Vec<Comment>>> {
    let comments = state.hub.list_comments(&ArtifactId::from(artifact_id))?;
    Ok(Json(comments))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentBody {
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<String>,
}

pub async fn update(
    State(state): State<Arc<HubState>>,
    Path((artifact_id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<UpdateCommentBody>,
) -> Result<Json<Comment>> {
    let user = authenticate(&state.config.auth, &headers)?;
    let updated = state
        .hub
        .edit_comment(
            &ArtifactId::from(artifact_id),
            &UserId::from(user.user_id),
            &comment_id,
            body.content,
            body.mentions,
        )
        .await?;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<Arc<HubState>>,
    Path((artifact_id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<()> {
    let user = authenticate(&state.config.auth, &headers)?;
    state
        .hub
        .remove_comment(&ArtifactId::from(artifact_id), &UserId::from(user.user_id), &comment_id)
        .await
}
