use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("provider response unparseable: {0}")]
    Parse(String),

    #[error("provider timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;
