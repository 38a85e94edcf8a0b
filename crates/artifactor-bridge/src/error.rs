use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("max coordination depth exceeded")]
    MaxDepthExceeded,

    #[error("agent handler error: {0}")]
    Handler(String),
}

impl BridgeError {
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::UnknownAgent(_) => "UNKNOWN_AGENT",
            BridgeError::MaxDepthExceeded => "MAX_COORDINATION_DEPTH_EXCEEDED",
            BridgeError::Handler(_) => "AGENT_HANDLER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
