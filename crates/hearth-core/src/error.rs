use thiserror::Error;

/// Top-level error for faults that cross component boundaries.
///
/// Most internal faults never surface as errors at all, the pipeline
/// degrades to a safe answer instead. The variants here cover the few
/// places where an error object is the right shape: startup, request
/// validation, and the gateway's HTTP mapping.
#[derive(Debug, Error)]
pub enum HearthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded: {limit} queries per minute")]
    RateLimited { limit: u32 },

    #[error("Model backend error: {0}")]
    Model(String),

    #[error("Request deadline exceeded after {seconds}s")]
    DeadlineExceeded { seconds: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HearthError {
    /// Short stable code string used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            HearthError::Config(_) => "CONFIG_ERROR",
            HearthError::InvalidRequest(_) => "INVALID_REQUEST",
            HearthError::RateLimited { .. } => "RATE_LIMITED",
            HearthError::Model(_) => "MODEL_ERROR",
            HearthError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            HearthError::Serialization(_) => "SERIALIZATION_ERROR",
            HearthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HearthError>;
