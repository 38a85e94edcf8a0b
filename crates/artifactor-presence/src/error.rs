use thiserror::Error;

/// All presence-layer errors. Kept separate from `ArtifactorError` so the hub
/// can map them to WS error frames without coupling layers.
#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("presence database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache error: {0}")]
    Cache(String),
}

impl PresenceError {
    pub fn code(&self) -> &'static str {
        match self {
            PresenceError::Database(_) => "PRESENCE_DB_ERROR",
            PresenceError::Cache(_) => "PRESENCE_CACHE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PresenceError>;
