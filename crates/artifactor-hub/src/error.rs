use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use artifactor_bridge::BridgeError;
use artifactor_cache::CacheError;
use artifactor_core::ArtifactorError;
use artifactor_notifications::NotificationError;
use artifactor_pipeline::PipelineError;
use artifactor_presence::PresenceError;
use artifactor_protocol::ServerMessage;

/// Composes every crate's error type at the hub boundary (SPEC_FULL.md §9B).
#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    Core(#[from] ArtifactorError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Presence(#[from] PresenceError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl HubError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        HubError::Core(ArtifactorError::not_found(kind, id))
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        HubError::Core(ArtifactorError::forbidden(reason))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        HubError::Core(ArtifactorError::Validation(msg.into()))
    }

    pub fn code(&self) -> &'static str {
        match self {
            HubError::Core(e) => e.code(),
            HubError::Cache(e) => e.code(),
            HubError::Presence(e) => e.code(),
            HubError::Notification(e) => e.code(),
            HubError::Pipeline(e) => e.code(),
            HubError::Bridge(e) => e.code(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HubError::Core(e) => {
                StatusCode::from_u16(e.status_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            HubError::Notification(NotificationError::NotFound { .. }) => StatusCode::NOT_FOUND,
            HubError::Bridge(BridgeError::UnknownAgent(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// WebSocket-style error frame for a failure attributable to one client message.
    pub fn ws_frame(&self) -> ServerMessage {
        ServerMessage::error(self.code(), &self.to_string())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "code": self.code(), "message": self.to_string() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
