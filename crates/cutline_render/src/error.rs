use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Whatever the decoder behind a `SampleSource` reported.
    #[error(transparent)]
    Source(#[from] anyhow::Error),

    #[error("levels task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
