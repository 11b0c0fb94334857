use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// The assistant answered, but not with a usable intent document.
    #[error("malformed assistant response: {0}")]
    MalformedResponse(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
