use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("iCal fetch failed: {0}")]
    Fetch(String),

    #[error("iCal parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, ModeError>;
