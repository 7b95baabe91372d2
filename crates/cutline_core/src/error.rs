use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Track not found: {0}")]
    TrackNotFound(usize),

    #[error("Clip not found: track {track} clip {clip}")]
    ClipNotFound { track: usize, clip: usize },

    #[error("Track {0} is locked")]
    TrackLocked(usize),

    #[error("Invalid producer: {0}")]
    InvalidProducer(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("No macro is open")]
    NoOpenMacro,
}

pub type Result<T> = std::result::Result<T, CoreError>;

pub(crate) fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidOperation(msg.into())
}
