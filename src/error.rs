//! Error taxonomy for spot operations.

/// Errors surfaced to callers of the spot store and engine.
#[derive(Debug, thiserror::Error)]
pub enum SpotError {
    #[error("spot not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("check already in progress for spot {0}")]
    InProgress(String),

    #[error("spot already exists: {0}")]
    Conflict(String),

    /// The store itself failed. Nothing else is unrecoverable.
    #[error("spot store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl SpotError {
    /// Stable machine-readable kind for the command layer.
    pub fn kind(&self) -> &'static str {
        match self {
            SpotError::NotFound(_) => "not_found",
            SpotError::Validation(_) => "validation_error",
            SpotError::InProgress(_) => "in_progress",
            SpotError::Conflict(_) => "conflict",
            SpotError::Store(_) => "store_error",
        }
    }
}

pub type Result<T> = core::result::Result<T, SpotError>;

/// Failure cause reported by the camera or vision adapters.
///
/// Adapter errors never escape the engine as `SpotError`; they are recorded on
/// the spot's history and reported as a failed check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("timeout")]
    Timeout,

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("rate limited")]
    RateLimited,

    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else {
            AdapterError::Transport(err.to_string())
        }
    }
}
