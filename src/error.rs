use std::time::Duration;

/// Errors raised while talking to the backend or the local credential store.
///
/// Server-reported business errors are not represented here: they arrive as
/// structurally valid replies and are surfaced to the caller as text.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f32),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
