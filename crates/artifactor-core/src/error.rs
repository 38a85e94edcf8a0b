use thiserror::Error;

/// Crate-wide error taxonomy shared by every service crate.
///
/// Each variant maps to one of the eight error kinds components are expected
/// to report against: transport, validation, not-found, forbidden, conflict,
/// storage, upstream, internal.
#[derive(Debug, Error)]
pub enum ArtifactorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ArtifactorError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Short error code string sent to clients in HTTP bodies and WS error frames.
    pub fn code(&self) -> &'static str {
        match self {
            ArtifactorError::Config(_) => "CONFIG_ERROR",
            ArtifactorError::Transport(_) => "TRANSPORT_ERROR",
            ArtifactorError::Validation(_) => "VALIDATION_ERROR",
            ArtifactorError::NotFound { .. } => "NOT_FOUND",
            ArtifactorError::Forbidden { .. } => "FORBIDDEN",
            ArtifactorError::Conflict(_) => "CONFLICT",
            ArtifactorError::Storage(_) => "STORAGE_ERROR",
            ArtifactorError::Upstream(_) => "UPSTREAM_ERROR",
            ArtifactorError::Serialization(_) => "SERIALIZATION_ERROR",
            ArtifactorError::Io(_) => "IO_ERROR",
            ArtifactorError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ArtifactorError::Timeout { .. } => "TIMEOUT",
            ArtifactorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Coarse HTTP-style status class, used by the hub's `IntoResponse` impl.
    pub fn status_u16(&self) -> u16 {
        match self {
            ArtifactorError::Validation(_) | ArtifactorError::PayloadTooLarge { .. } => 400,
            ArtifactorError::Forbidden { .. } => 403,
            ArtifactorError::NotFound { .. } => 404,
            ArtifactorError::Conflict(_) => 409,
            ArtifactorError::Timeout { .. } => 408,
            ArtifactorError::Transport(_) => 499,
            ArtifactorError::Upstream(_) => 502,
            ArtifactorError::Storage(_)
            | ArtifactorError::Config(_)
            | ArtifactorError::Serialization(_)
            | ArtifactorError::Io(_)
            | ArtifactorError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArtifactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_kind_and_id() {
        let err = ArtifactorError::not_found("comment", "c1");
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.status_u16(), 404);
        assert!(err.to_string().contains("comment"));
    }

    #[test]
    fn forbidden_maps_to_403() {
        let err = ArtifactorError::forbidden("not the comment author");
        assert_eq!(err.status_u16(), 403);
    }
}
