//! Error types for the artifactor-metrics crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

impl MetricsError {
    pub fn code(&self) -> &'static str {
        match self {
            MetricsError::UnknownMetric(_) => "NOT_FOUND",
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, MetricsError>;
