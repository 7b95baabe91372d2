use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Playback clock has stopped")]
    ClockStopped,

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f64),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
