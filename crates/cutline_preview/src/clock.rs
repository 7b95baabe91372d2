use crate::error::{PreviewError, Result};
use crate::queue::{FrameQueue, FrameShown};
use cutline_core::Player;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

/// Requests accepted by the playback clock.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Load {
        composition: Uuid,
        length: i32,
        fps: f64,
    },
    Play,
    Pause,
    Seek(i32),
    Shutdown,
}

struct Loaded {
    composition: Uuid,
    length: i32,
}

fn frame_period(fps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / fps)
}

fn frame_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Owns play/pause/seek state for one loaded composition and reports each
/// displayed frame.
pub struct PlaybackClock {
    commands: mpsc::UnboundedReceiver<PlayerCommand>,
    frames: mpsc::UnboundedSender<FrameShown>,
    loaded: Option<Loaded>,
    position: i32,
    playing: bool,
}

impl PlaybackClock {
    /// Start the clock on the current tokio runtime.
    pub fn spawn() -> (PreviewHandle, FrameQueue, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let clock = PlaybackClock {
            commands: command_rx,
            frames: frame_tx,
            loaded: None,
            position: 0,
            playing: false,
        };
        let task = tokio::spawn(clock.run());
        let handle = PreviewHandle {
            commands: command_tx,
            active: Arc::new(Mutex::new(None)),
        };
        (handle, FrameQueue::new(frame_rx), task)
    }

    async fn run(mut self) {
        let mut ticker = frame_ticker(frame_period(30.0));
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.apply(command, &mut ticker) {
                        break;
                    }
                }
                _ = ticker.tick(), if self.playing => {
                    if !self.advance() {
                        break;
                    }
                }
            }
        }
        debug!("playback clock stopped");
    }

    /// Returns false when the clock should stop.
    fn apply(&mut self, command: PlayerCommand, ticker: &mut Interval) -> bool {
        match command {
            PlayerCommand::Load {
                composition,
                length,
                fps,
            } => {
                debug!(%composition, length, fps, "composition loaded");
                self.loaded = Some(Loaded {
                    composition,
                    length,
                });
                self.position = 0;
                self.playing = false;
                *ticker = frame_ticker(frame_period(fps));
                true
            }
            PlayerCommand::Play => {
                if self.loaded.as_ref().is_some_and(|l| self.position + 1 < l.length) {
                    self.playing = true;
                    ticker.reset();
                }
                true
            }
            PlayerCommand::Pause => {
                self.playing = false;
                true
            }
            PlayerCommand::Seek(position) => {
                let Some(length) = self.loaded.as_ref().map(|l| l.length) else {
                    return true;
                };
                self.position = position.clamp(0, (length - 1).max(0));
                self.emit()
            }
            PlayerCommand::Shutdown => false,
        }
    }

    fn advance(&mut self) -> bool {
        let Some(length) = self.loaded.as_ref().map(|l| l.length) else {
            self.playing = false;
            return true;
        };
        if self.position + 1 >= length {
            self.playing = false;
            return true;
        }
        self.position += 1;
        if self.position + 1 >= length {
            self.playing = false;
        }
        self.emit()
    }

    fn emit(&self) -> bool {
        let Some(loaded) = &self.loaded else {
            return true;
        };
        self.frames
            .send(FrameShown {
                composition: loaded.composition,
                position: self.position,
            })
            .is_ok()
    }
}

/// Cheap, cloneable control surface for the clock. Sending never blocks.
#[derive(Clone)]
pub struct PreviewHandle {
    commands: mpsc::UnboundedSender<PlayerCommand>,
    active: Arc<Mutex<Option<Uuid>>>,
}

impl PreviewHandle {
    pub fn send(&self, command: PlayerCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PreviewError::ClockStopped)
    }

    /// Make `composition` the one being played.
    pub fn load(&self, composition: Uuid, length: i32, fps: f64) -> Result<()> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(PreviewError::InvalidFrameRate(fps));
        }
        self.send(PlayerCommand::Load {
            composition,
            length,
            fps,
        })?;
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(composition);
        Ok(())
    }

    pub fn play(&self) -> Result<()> {
        self.send(PlayerCommand::Play)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(PlayerCommand::Shutdown)
    }
}

impl Player for PreviewHandle {
    fn pause(&mut self) {
        if let Err(e) = self.send(PlayerCommand::Pause) {
            warn!(error = %e, "pause not delivered");
        }
    }

    fn seek(&mut self, position: i32) {
        if let Err(e) = self.send(PlayerCommand::Seek(position)) {
            warn!(position, error = %e, "seek not delivered");
        }
    }

    fn active_composition(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    async fn next(queue: &mut FrameQueue) -> FrameShown {
        timeout(Duration::from_secs(2), queue.recv())
            .await
            .expect("frame within timeout")
            .expect("clock running")
    }

    #[tokio::test]
    async fn seek_reports_one_clamped_frame() {
        let (mut handle, mut queue, _task) = PlaybackClock::spawn();
        let id = Uuid::new_v4();
        handle.load(id, 100, 30.0).unwrap();

        handle.seek(42);
        assert_eq!(next(&mut queue).await, FrameShown { composition: id, position: 42 });
        handle.seek(500);
        assert_eq!(next(&mut queue).await.position, 99);
        handle.seek(-3);
        assert_eq!(next(&mut queue).await.position, 0);
    }

    #[tokio::test]
    async fn nothing_is_reported_before_a_load() {
        let (mut handle, mut queue, _task) = PlaybackClock::spawn();
        handle.seek(10);
        handle.play().unwrap();
        assert!(timeout(Duration::from_millis(100), queue.recv()).await.is_err());
        assert_eq!(handle.active_composition(), None);
    }

    #[tokio::test]
    async fn playing_advances_one_frame_per_tick() {
        let (mut handle, mut queue, _task) = PlaybackClock::spawn();
        let id = Uuid::new_v4();
        handle.load(id, 100, 200.0).unwrap();
        handle.seek(0);
        assert_eq!(next(&mut queue).await.position, 0);

        handle.play().unwrap();
        for expected in 1..=3 {
            assert_eq!(next(&mut queue).await.position, expected);
        }
        handle.pause();
    }

    #[tokio::test]
    async fn playback_stops_on_last_frame() {
        let (mut handle, mut queue, _task) = PlaybackClock::spawn();
        handle.load(Uuid::new_v4(), 3, 200.0).unwrap();
        handle.seek(0);
        next(&mut queue).await;
        handle.play().unwrap();
        assert_eq!(next(&mut queue).await.position, 1);
        assert_eq!(next(&mut queue).await.position, 2);
        assert!(timeout(Duration::from_millis(100), queue.recv()).await.is_err());
    }

    #[tokio::test]
    async fn shutdown_ends_the_task() {
        let (handle, _queue, task) = PlaybackClock::spawn();
        handle.shutdown().unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(matches!(handle.play(), Err(PreviewError::ClockStopped)));
    }

    #[tokio::test]
    async fn rejects_bad_frame_rate() {
        let (handle, _queue, _task) = PlaybackClock::spawn();
        assert!(matches!(
            handle.load(Uuid::new_v4(), 10, 0.0),
            Err(PreviewError::InvalidFrameRate(_))
        ));
        assert_eq!(handle.active_composition(), None);
    }
}
