//! Background audio levels for timeline clips.

pub mod error;
pub mod levels;
pub mod waveform;

pub use error::{RenderError, Result};
pub use levels::{ClipKey, LevelsScheduler};
pub use waveform::{compute_peaks, SampleSource, WaveformCache, WaveformData};
