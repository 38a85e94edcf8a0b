use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification not found: {id}")]
    NotFound { id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl NotificationError {
    pub fn code(&self) -> &'static str {
        match self {
            NotificationError::NotFound { .. } => "NOTIFICATION_NOT_FOUND",
            NotificationError::Database(_) => "NOTIFICATION_DB_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;
