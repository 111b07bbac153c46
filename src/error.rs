use std::io;

#[derive(Debug, thiserror::Error)]
pub enum RefrainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("batch index {index} out of range for {len} batches")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("songbase error: {0}")]
    Songbase(String),

    #[error("feature extraction error: {0}")]
    Extract(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RefrainError>;
