//! Fixtures shared by the crate's unit tests.

use crate::editor::TimelineEditor;
use crate::events::EventBus;
use crate::model::MultitrackModel;
use crate::producer::Producer;
use crate::profile::{EditorConfig, Profile};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn clip(length: i32) -> Producer {
    Producer::new("avformat", "/media/clip.mp4", length)
}

pub fn cut(length: i32, frame_in: i32, frame_out: i32) -> Producer {
    clip(length).cut(frame_in, frame_out)
}

pub fn blank(length: i32) -> Producer {
    Producer::blank(length)
}

fn fill_first_track(model: &mut MultitrackModel, slots: &[Producer]) {
    if let Ok(playlist) = model.playlist_mut(0) {
        playlist.entries = slots.to_vec();
    }
}

/// A fresh model whose V1 holds `slots` verbatim.
pub fn model_with(slots: &[Producer]) -> MultitrackModel {
    init_tracing();
    let mut model = MultitrackModel::new(Profile::default(), EventBus::new());
    fill_first_track(&mut model, slots);
    model
}

/// An editor over a model whose V1 holds `slots` verbatim.
pub fn editor_with(slots: &[Producer]) -> TimelineEditor {
    init_tracing();
    let mut editor = TimelineEditor::new(EditorConfig::default());
    fill_first_track(editor.timeline_mut().model_mut(), slots);
    editor
}

/// Checks the structural invariants every edit must preserve.
pub fn assert_track_consistent(model: &MultitrackModel, track: usize) {
    let pl = model.playlist(track).expect("track exists");
    let mut start = 0;
    for i in 0..pl.count() {
        let p = pl.clip(i).unwrap();
        assert!(p.is_valid(), "slot {i} invalid: {p:?}");
        assert_eq!(pl.clip_start(i), start, "slot {i} not contiguous");
        start += p.get_playtime();
        if p.is_blank() {
            assert!(!pl.is_blank(i + 1), "adjacent blanks at {i}");
        }
        if p.is_transition() {
            let a = pl.clip(i - 1).expect("outgoing clip");
            let b = pl.clip(i + 1).expect("incoming clip");
            assert!(!a.is_blank() && !a.is_transition());
            assert!(!b.is_blank() && !b.is_transition());
            let a_cut = p.outgoing().unwrap();
            let b_cut = p.incoming().unwrap();
            assert_eq!(a_cut.get_in(), a.get_out() + 1, "outgoing cut follows A");
            assert_eq!(b_cut.get_out(), b.get_in() - 1, "incoming cut precedes B");
        }
    }
    assert!(
        !pl.entries.last().is_some_and(Producer::is_blank),
        "trailing blank"
    );
}
