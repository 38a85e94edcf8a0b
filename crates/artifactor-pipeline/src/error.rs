use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage failed: {stage}: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("cache error: {0}")]
    Cache(String),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::StageFailed { .. } => "PIPELINE_STAGE_FAILED",
            PipelineError::Cache(_) => "PIPELINE_CACHE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
