//! Playback side of the timeline: a clock task standing in for the player
//! and the queue that carries displayed frames back to the editor.

pub mod clock;
pub mod error;
pub mod queue;

pub use clock::{PlaybackClock, PlayerCommand, PreviewHandle};
pub use error::{PreviewError, Result};
pub use queue::{FrameQueue, FrameShown};
