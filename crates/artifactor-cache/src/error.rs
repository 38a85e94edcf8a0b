use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("backing store error: {0}")]
    Storage(String),

    #[error("value exceeds tier-1 capacity: {size} bytes (capacity {capacity})")]
    TooLarge { size: usize, capacity: usize },
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Storage(_) => "STORAGE_ERROR",
            CacheError::TooLarge { .. } => "VALIDATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
