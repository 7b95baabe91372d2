use cutline_core::TimelineEditor;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A frame the player has displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameShown {
    pub composition: Uuid,
    pub position: i32,
}

/// Receiving end of the clock's frame notifications, drained on the thread
/// that owns the timeline.
pub struct FrameQueue {
    frames: mpsc::UnboundedReceiver<FrameShown>,
}

impl FrameQueue {
    pub(crate) fn new(frames: mpsc::UnboundedReceiver<FrameShown>) -> Self {
        Self { frames }
    }

    pub async fn recv(&mut self) -> Option<FrameShown> {
        self.frames.recv().await
    }

    /// Forward every pending notification to the editor without waiting.
    /// Returns how many were forwarded.
    pub fn pump(&mut self, editor: &mut TimelineEditor) -> usize {
        let mut forwarded = 0;
        while let Ok(frame) = self.frames.try_recv() {
            editor.on_show_frame(frame.composition, frame.position);
            forwarded += 1;
        }
        if forwarded > 0 {
            debug!(forwarded, position = editor.position(), "frames pumped");
        }
        forwarded
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::clock::PlaybackClock;
    use cutline_core::{EditorConfig, EventBus, MultitrackModel, Player, Producer, Profile, TimelineEditor};
    use std::time::Duration;
    use uuid::Uuid;

    fn editor() -> TimelineEditor {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut model = MultitrackModel::new(Profile::default(), EventBus::new());
        model
            .append(0, Producer::new("avformat", "/media/a.mp4", 100))
            .unwrap();
        TimelineEditor::with_model(EditorConfig::default(), model)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn pump_moves_the_playhead() {
        let mut ed = editor();
        let (handle, mut queue, _task) = PlaybackClock::spawn();
        let id = ed.model().composition_id();
        handle.load(id, ed.model().duration(), 30.0).unwrap();
        ed.set_player(Box::new(handle.clone()));

        let mut remote = handle.clone();
        remote.seek(42);
        settle().await;
        assert_eq!(queue.pump(&mut ed), 1);
        assert_eq!(ed.position(), 42);
        assert_eq!(queue.pump(&mut ed), 0);
    }

    #[tokio::test]
    async fn frames_of_another_composition_are_dropped() {
        let mut ed = editor();
        let (mut handle, mut queue, _task) = PlaybackClock::spawn();
        handle.load(Uuid::new_v4(), 500, 30.0).unwrap();

        handle.seek(10);
        settle().await;
        assert_eq!(queue.pump(&mut ed), 1);
        assert_eq!(ed.position(), 0);
    }

    #[tokio::test]
    async fn editor_seeks_go_through_the_clock() {
        let mut ed = editor();
        let (handle, mut queue, _task) = PlaybackClock::spawn();
        handle
            .load(ed.model().composition_id(), ed.model().duration(), 30.0)
            .unwrap();
        ed.set_player(Box::new(handle));

        ed.set_position(250);
        assert_eq!(ed.position(), 99);
        settle().await;
        let frame = queue.recv().await.unwrap();
        assert_eq!(frame.position, 99);
    }
}
