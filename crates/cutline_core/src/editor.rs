use crate::commands::*;
use crate::error::Result;
use crate::events::{EventBus, SelectedItem, TimelineEvent};
use crate::history::UndoStack;
use crate::model::{MultitrackModel, TrackKind};
use crate::playlist::{ClipInfo, Playlist};
use crate::producer::{Producer, TIMEWARP_SERVICE};
use crate::profile::EditorConfig;
use crate::seek::{collect_edit_points, find_snap_point, next_edit, previous_edit};
use crate::selection::Selection;
use crate::timecode::{frames_to_time, time_to_frames, TimeFormat};
use crate::timeline::Timeline;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Services whose in/out points are rescaled when their speed changes.
const RESCALED_SERVICES: [&str; 3] = ["avformat", "avformat-novalidate", TIMEWARP_SERVICE];

/// The playback engine as seen from the timeline.
pub trait Player {
    fn pause(&mut self);
    fn seek(&mut self, position: i32);
    /// The composition currently loaded for playback, if the player reports
    /// one. A player that reports none does not restrict the timeline.
    fn active_composition(&self) -> Option<Uuid>;
}

/// Player used when nothing is attached for playback.
#[derive(Debug, Default)]
pub struct NullPlayer;

impl Player for NullPlayer {
    fn pause(&mut self) {}

    fn seek(&mut self, _position: i32) {}

    fn active_composition(&self) -> Option<Uuid> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimLocation {
    InPoint,
    OutPoint,
}

/// Same tie-breaking as the engine: halves round towards positive infinity.
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

/// Turns user gestures into commands on the undo stack.
///
/// Every gesture returns whether a command landed. Locked tracks, illegal
/// edits and missing targets are reported through events and logs; the
/// model is never touched in those cases.
pub struct TimelineEditor {
    timeline: Timeline,
    history: UndoStack,
    player: Box<dyn Player>,
    config: EditorConfig,
    position: i32,
    current_track: usize,
    source: Option<Producer>,
    clipboard: Option<Producer>,
    pending_update: Option<UpdateCommand>,
    ignore_next_position_change: bool,
}

impl TimelineEditor {
    pub fn new(config: EditorConfig) -> Self {
        let timeline = Timeline::new(config.profile.clone());
        Self::with_timeline(config, timeline, Box::new(NullPlayer))
    }

    pub fn with_player(config: EditorConfig, player: Box<dyn Player>) -> Self {
        let timeline = Timeline::new(config.profile.clone());
        Self::with_timeline(config, timeline, player)
    }

    /// Edit an existing composition.
    pub fn with_model(config: EditorConfig, model: MultitrackModel) -> Self {
        Self::with_timeline(config, Timeline::from_model(model), Box::new(NullPlayer))
    }

    fn with_timeline(config: EditorConfig, timeline: Timeline, player: Box<dyn Player>) -> Self {
        Self {
            timeline,
            history: UndoStack::new(config.undo_limit),
            player,
            config,
            position: 0,
            current_track: 0,
            source: None,
            clipboard: None,
            pending_update: None,
            ignore_next_position_change: false,
        }
    }

    pub fn set_player(&mut self, player: Box<dyn Player>) {
        self.player = player;
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[cfg(test)]
    pub(crate) fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn model(&self) -> &MultitrackModel {
        self.timeline.model()
    }

    pub fn events(&self) -> &EventBus {
        self.timeline.events()
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// The clip open in the source viewer; edits use it before the clipboard.
    pub fn set_source(&mut self, producer: Option<Producer>) {
        self.source = producer;
    }

    pub fn clipboard(&self) -> Option<&Producer> {
        self.clipboard.as_ref()
    }

    fn emit(&self, event: TimelineEvent) {
        self.timeline.events().emit(event);
    }

    // -----------------------------------------------------------------------
    // Command plumbing
    // -----------------------------------------------------------------------

    fn push(&mut self, op: impl Into<EditOperation>) -> bool {
        let op = op.into();
        let text = op.text();
        match self.history.push(op, &mut self.timeline) {
            Ok(()) => true,
            Err(e) => {
                debug!(text, error = %e, "edit rejected");
                false
            }
        }
    }

    /// Run `edit` inside an undo macro. A failed edit rolls back whatever it
    /// already pushed.
    fn in_macro(&mut self, text: &str, edit: impl FnOnce(&mut Self) -> bool) -> bool {
        self.history.begin_macro(text);
        if edit(self) {
            if let Err(e) = self.history.end_macro() {
                warn!(error = %e, "macro was not open");
            }
            true
        } else {
            if let Err(e) = self.history.abort_macro(&mut self.timeline) {
                warn!(text, error = %e, "macro rollback failed");
            }
            false
        }
    }

    pub fn is_track_locked(&self, track: usize) -> bool {
        self.model().is_track_locked(track)
    }

    fn pulse_lock(&self, track: usize) {
        info!(track, "edit refused on locked track");
        self.emit(TimelineEvent::TrackLockPulse(track));
        self.emit(TimelineEvent::StatusMessage("This track is locked".into()));
    }

    fn unlocked(&self, track: usize) -> bool {
        if self.is_track_locked(track) {
            self.pulse_lock(track);
            return false;
        }
        true
    }

    fn source_or_clipboard(&self) -> Option<String> {
        let producer = self.source.as_ref().or(self.clipboard.as_ref())?;
        match producer.to_text() {
            Ok(xml) => Some(xml),
            Err(e) => {
                warn!(error = %e, "cannot serialize source clip");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Position
    // -----------------------------------------------------------------------

    pub fn position(&self) -> i32 {
        self.position
    }

    fn is_active(&self) -> bool {
        self.player
            .active_composition()
            .map_or(true, |id| id == self.model().composition_id())
    }

    /// Seek the player, clamping to the composition.
    pub fn set_position(&mut self, position: i32) {
        let last = (self.model().duration() - 1).max(0);
        let position = position.clamp(0, last);
        self.player.seek(position);
        self.position = position;
        self.emit(TimelineEvent::PositionChanged(position));
    }

    pub fn on_seeked(&mut self, position: i32) {
        debug_assert!(position >= 0, "player reported a negative position");
        if self.is_active() {
            self.position = position.max(0);
            self.emit(TimelineEvent::PositionChanged(self.position));
        }
    }

    /// A frame was displayed by the player. Frames from another
    /// composition or past the play length are ignored.
    pub fn on_show_frame(&mut self, composition: Uuid, position: i32) {
        if self.ignore_next_position_change {
            self.ignore_next_position_change = false;
            return;
        }
        if composition != self.model().composition_id() {
            debug!(%composition, "frame from inactive composition dropped");
            return;
        }
        if (0..self.model().duration()).contains(&position) {
            self.position = position;
            self.emit(TimelineEvent::PositionChanged(position));
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn current_track(&self) -> usize {
        self.current_track
    }

    pub fn set_current_track(&mut self, track: usize) {
        self.current_track = track;
    }

    pub fn clip_index_at_position(&self, track: Option<usize>, position: i32) -> Option<usize> {
        let track = track.unwrap_or(self.current_track);
        self.model().clip_index_at(track, position)
    }

    pub fn clip_index_at_playhead(&self, track: Option<usize>) -> Option<usize> {
        self.clip_index_at_position(track, self.position)
    }

    pub fn clip_count(&self, track: Option<usize>) -> usize {
        self.model().clip_count(track.unwrap_or(self.current_track))
    }

    pub fn is_blank(&self, track: usize, clip: usize) -> bool {
        self.model().is_blank(track, clip)
    }

    pub fn clip_info(&self, track: usize, clip: usize) -> Option<ClipInfo> {
        self.model().clip_info(track, clip)
    }

    pub fn producer_for_clip(&self, track: usize, clip: usize) -> Option<&Producer> {
        self.model().producer_for_clip(track, clip)
    }

    pub fn timecode(&self, frames: i32) -> String {
        frames_to_time(frames, self.model().profile(), TimeFormat::Smpte)
    }

    pub fn time_to_frames(&self, text: &str) -> Result<i32> {
        time_to_frames(text, self.model().profile())
    }

    /// The clip a playhead gesture applies to: the given track, then the
    /// current track, then every other unlocked track in row order. Blank
    /// slots never match.
    pub fn choose_clip_at_position(&self, position: i32, track: Option<usize>) -> Option<(usize, usize)> {
        let model = self.model();
        let hit = |track: usize| {
            model
                .clip_index_at(track, position)
                .filter(|&clip| !model.is_blank(track, clip))
        };

        if let Some(track) = track.filter(|&t| !model.is_track_locked(t)) {
            if let Some(clip) = hit(track) {
                return Some((track, clip));
            }
        }
        let current = self.current_track;
        if !model.is_track_locked(current) {
            if let Some(clip) = hit(current) {
                return Some((current, clip));
            }
        }
        (0..model.track_count())
            .filter(|&t| t != current && !model.is_track_locked(t))
            .find_map(|t| hit(t).map(|clip| (t, clip)))
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn selection(&self) -> &Selection {
        self.timeline.selection()
    }

    /// Change the selection as an undoable step.
    pub fn set_selection(&mut self, selection: Selection) {
        self.apply_selection(selection, false);
    }

    fn apply_selection(&mut self, selection: Selection, from_undo: bool) {
        if *self.selection() == selection {
            return;
        }
        debug!(?selection, from_undo, "selection changed");
        if from_undo {
            self.timeline.set_selection(selection);
        } else {
            let old = self.selection().clone();
            self.push(ClipsSelectCommand::new(selection, old));
        }
        self.player.pause();
        if self.selection().has_clips() {
            self.emit_selected_from_selection();
        } else {
            self.emit(TimelineEvent::Selected(None));
        }
    }

    /// Tell the properties panel about the first selected clip and prepare
    /// an update command for edits made there.
    fn emit_selected_from_selection(&mut self) {
        if self.model().track_count() == 0 {
            self.emit(TimelineEvent::Selected(Some(SelectedItem::Multitrack)));
            return;
        }
        let Some(track) = self.selection().selected_track() else {
            return;
        };
        let clip = self.selection().clips().first().copied().unwrap_or(0);
        let Some(info) = self.clip_info(track, clip) else {
            return;
        };
        match info.producer.to_text() {
            Ok(xml) => {
                self.pending_update = Some(UpdateCommand::new(track, clip, xml, String::new(), false));
            }
            Err(e) => warn!(track, clip, error = %e, "cannot capture clip for update"),
        }
        self.ignore_next_position_change = true;
        self.emit(TimelineEvent::Selected(Some(SelectedItem::Clip {
            track,
            clip,
            producer: info.producer,
        })));
    }

    pub fn save_and_clear_selection(&mut self) {
        self.timeline.save_and_clear_selection();
    }

    pub fn restore_selection(&mut self) {
        self.timeline.restore_selection();
        self.emit_selected_from_selection();
    }

    pub fn select_clip_under_playhead(&mut self) {
        match self.choose_clip_at_position(self.position, None) {
            Some((track, clip)) => {
                self.current_track = track;
                self.set_selection(Selection::clips_on(track, vec![clip]));
            }
            None => {
                if self.is_track_locked(self.current_track) {
                    self.pulse_lock(self.current_track);
                    return;
                }
                self.set_selection(Selection::none());
            }
        }
    }

    pub fn select_clip_at_position(&mut self, track: usize, position: i32) {
        self.current_track = track;
        let selection = match self.clip_index_at_position(Some(track), position) {
            Some(clip) => Selection::clips_on(track, vec![clip]),
            None => Selection::none(),
        };
        self.set_selection(selection);
    }

    /// Move the current track by `by` rows, staying in range.
    pub fn select_track(&mut self, by: i32) {
        let last = self.model().track_count().saturating_sub(1) as i64;
        let row = (self.current_track as i64 + i64::from(by)).clamp(0, last);
        self.current_track = row as usize;
    }

    pub fn select_track_head(&mut self, track: usize) {
        if self.model().track(track).is_none() {
            return;
        }
        self.set_selection(Selection::track(track));
        self.emit(TimelineEvent::Selected(Some(SelectedItem::Track(track))));
    }

    pub fn select_multitrack(&mut self) {
        self.set_selection(Selection::multitrack());
        self.emit(TimelineEvent::Selected(Some(SelectedItem::Multitrack)));
    }

    /// Drop selected indexes that no longer address a clip.
    pub fn clear_selection_if_invalid(&mut self, from_undo: bool) {
        let Some(track) = self.selection().selected_track() else {
            return;
        };
        let count = self.model().clip_count(track);
        let clips: Vec<usize> = self
            .selection()
            .clips()
            .iter()
            .copied()
            .filter(|&clip| clip < count && !self.is_blank(track, clip))
            .collect();
        self.apply_selection(Selection::clips_on(track, clips), from_undo);
        self.emit(TimelineEvent::SelectionChanged);
    }

    fn selected_clip(&self) -> Option<(usize, usize)> {
        let selection = self.selection();
        Some((selection.selected_track()?, *selection.clips().first()?))
    }

    // -----------------------------------------------------------------------
    // Placement
    // -----------------------------------------------------------------------

    /// Append the source clip (or the clipboard) to `track`, defaulting to
    /// the current track.
    pub fn append(&mut self, track: Option<usize>) -> bool {
        let track = track.unwrap_or(self.current_track);
        if !self.unlocked(track) {
            return false;
        }
        let Some(xml) = self.source_or_clipboard() else {
            return false;
        };
        let landed = if self.config.transition_after_append {
            self.in_macro("Append to track", |ed| {
                ed.push(AppendCommand::new(track, xml)) && {
                    ed.add_transition_on_clip_after_append();
                    true
                }
            })
        } else {
            self.push(AppendCommand::new(track, xml))
        };
        self.select_clip_under_playhead();
        landed
    }

    /// Insert `xml` (or the source clip) at `position` (or the playhead),
    /// pushing later slots right.
    pub fn insert(&mut self, track: Option<usize>, position: Option<i32>, xml: Option<&str>) -> bool {
        let track = track.unwrap_or(self.current_track);
        if !self.unlocked(track) {
            return false;
        }
        let Some(xml) = xml.map(str::to_string).or_else(|| self.source_or_clipboard()) else {
            return false;
        };
        let position = position.unwrap_or(self.position);
        let landed = self.push(InsertCommand::new(track, position, xml));
        self.select_clip_under_playhead();
        landed
    }

    /// Like [`TimelineEditor::insert`] but replaces what lies underneath.
    pub fn overwrite(&mut self, track: Option<usize>, position: Option<i32>, xml: Option<&str>) -> bool {
        let track = track.unwrap_or(self.current_track);
        if !self.unlocked(track) {
            return false;
        }
        let Some(xml) = xml.map(str::to_string).or_else(|| self.source_or_clipboard()) else {
            return false;
        };
        let position = position.unwrap_or(self.position);
        let landed = self.push(OverwriteCommand::new(track, position, xml));
        self.select_clip_under_playhead();
        landed
    }

    pub fn append_from_playlist(&mut self, playlist: &Playlist) -> bool {
        let track = self.current_track;
        if !self.unlocked(track) {
            return false;
        }
        let xml = match playlist.to_text() {
            Ok(xml) => xml,
            Err(e) => {
                warn!(error = %e, "cannot serialize playlist");
                return false;
            }
        };
        let landed = self.push(AppendPlaylistCommand::new(track, xml));
        self.select_clip_under_playhead();
        landed
    }

    pub fn add_filter_to_timeline(&mut self, producer: &Producer) -> bool {
        self.add_overlay(TrackKind::Filter, producer)
    }

    pub fn add_text_to_timeline(&mut self, producer: &Producer) -> bool {
        self.add_overlay(TrackKind::Text, producer)
    }

    fn track_of_kind(&self, kind: TrackKind) -> Option<usize> {
        let tracks = self.model().track_list();
        if tracks.get(self.current_track).is_some_and(|t| t.kind == kind) {
            return Some(self.current_track);
        }
        tracks.iter().position(|t| t.kind == kind)
    }

    /// Place `producer` on the current track of `kind`, creating one when
    /// the composition has none.
    fn add_overlay(&mut self, kind: TrackKind, producer: &Producer) -> bool {
        let xml = match producer.to_text() {
            Ok(xml) => xml,
            Err(e) => {
                warn!(error = %e, "cannot serialize overlay");
                return false;
            }
        };
        let position = self.position;
        let text = match kind {
            TrackKind::Text => "Add text to timeline",
            _ => "Add filter to timeline",
        };
        let mut placed = None;
        let landed = self.in_macro(text, |ed| {
            let track = match ed.track_of_kind(kind) {
                Some(track) => track,
                None => {
                    if !ed.push(AddTrackCommand::new(kind)) {
                        return false;
                    }
                    ed.emit(TimelineEvent::TracksChanged);
                    match ed.track_of_kind(kind) {
                        Some(track) => track,
                        None => return false,
                    }
                }
            };
            if !ed.unlocked(track) {
                return false;
            }
            let pushed = match kind {
                TrackKind::Text => ed.push(AddTextCommand::new(track, position, xml)),
                _ => ed.push(AddFilterCommand::new(track, position, xml)),
            };
            placed = pushed.then_some(track);
            pushed
        });
        if let Some(track) = placed {
            if let Some(clip) = self.clip_index_at_position(Some(track), position) {
                self.emit(TimelineEvent::FilterAdded { track, clip });
            }
        }
        landed
    }

    /// A one-second dissolve into the last clip of the default video track.
    pub fn add_transition_on_clip_after_append(&mut self) -> bool {
        let track = self.current_track;
        let Some(info) = self.model().track(track).cloned() else {
            return false;
        };
        if info.number != 0 || info.kind != TrackKind::Video {
            return false;
        }
        let Some(clip) = self.model().clip_count(track).checked_sub(1) else {
            return false;
        };
        let Some(start) = self.clip_info(track, clip).map(|i| i.start) else {
            return false;
        };
        let position = start - self.model().profile().fps() as i32;
        if !self.model().add_transition_valid(track, track, clip, position) {
            return false;
        }
        self.push(AddTransitionCommand::new(track, clip, position))
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Fold any transitions beside `clip` back into it as one undo step.
    /// Returns the clip's index afterwards.
    pub fn remove_transition_on_clip_with_undo(&mut self, track: usize, clip: usize) -> usize {
        let model = self.model();
        if model.is_transition_at(track, clip) {
            return clip;
        }
        let before = clip > 0 && model.is_transition_at(track, clip - 1);
        let after = model.is_transition_at(track, clip + 1);
        if !(before || after) {
            return clip;
        }
        if !self.push(RemoveTransitionsOnClipCommand::new(track, clip)) {
            return clip;
        }
        if before {
            clip - 1
        } else {
            clip
        }
    }

    /// Delete a slot and close the gap.
    pub fn remove(&mut self, track: usize, clip: usize) -> bool {
        if self.model().track_count() == 0 || !self.unlocked(track) {
            return false;
        }
        if self.producer_for_clip(track, clip).is_none() {
            return false;
        }
        self.in_macro("Remove from track", |ed| {
            let clip = ed.remove_transition_on_clip_with_undo(track, clip);
            ed.push(RemoveCommand::new(track, clip))
        })
    }

    /// Replace a clip with a gap of the same length.
    pub fn lift(&mut self, track: usize, clip: usize) -> bool {
        if self.model().track_count() == 0 || !self.unlocked(track) {
            return false;
        }
        if !self.producer_for_clip(track, clip).is_some_and(|p| !p.is_blank()) {
            return false;
        }
        let landed = self.in_macro("Lift from track", |ed| {
            let clip = ed.remove_transition_on_clip_with_undo(track, clip);
            ed.push(LiftCommand::new(track, clip))
        });
        if landed {
            self.set_selection(Selection::track(track));
        }
        landed
    }

    fn selection_or_playhead(&mut self) -> Vec<usize> {
        if !self.selection().has_clips() {
            self.select_clip_under_playhead();
        }
        let mut clips = self.selection().clips().to_vec();
        clips.sort_unstable_by(|a, b| b.cmp(a));
        clips
    }

    /// Remove every selected clip on the current track, falling back to
    /// the clip under the playhead.
    pub fn remove_selection(&mut self, with_copy: bool) -> bool {
        let track = self.current_track;
        if !self.unlocked(track) {
            return false;
        }
        let clips = self.selection_or_playhead();
        let Some(&first) = clips.last() else {
            return false;
        };
        if with_copy {
            self.copy_clip(track, first);
        }
        let mut landed = false;
        for clip in clips {
            landed |= self.remove(track, clip);
        }
        self.clear_selection_if_invalid(false);
        landed
    }

    pub fn lift_selection(&mut self) -> bool {
        let track = self.current_track;
        if !self.unlocked(track) {
            return false;
        }
        let mut landed = false;
        for clip in self.selection_or_playhead() {
            landed |= self.lift(track, clip);
        }
        landed
    }

    /// Put a copy of the clip on the clipboard.
    pub fn copy_clip(&mut self, track: usize, clip: usize) -> bool {
        let Some(producer) = self.producer_for_clip(track, clip).filter(|p| !p.is_blank()).cloned() else {
            return false;
        };
        self.clipboard = Some(producer);
        self.emit(TimelineEvent::ClipCopied);
        true
    }

    pub fn remove_transition(&mut self, track: usize, transition: usize) -> bool {
        if self.model().track_count() == 0 || !self.unlocked(track) {
            return false;
        }
        if !self.model().is_transition_at(track, transition) {
            return false;
        }
        self.push(RemoveTransitionCommand::new(track, transition))
    }

    /// Resize the selected transition.
    pub fn set_transition_duration(&mut self, duration: i32) -> bool {
        let track = self.current_track;
        let Some(&transition) = self.selection().clips().first() else {
            return false;
        };
        if !self.unlocked(track) {
            return false;
        }
        self.push(SetTransitionDurationCommand::new(track, transition, duration))
    }

    // -----------------------------------------------------------------------
    // Split, trim, fade
    // -----------------------------------------------------------------------

    /// Split at the playhead. Without an explicit target the clip under the
    /// playhead is used.
    pub fn split_clip(&mut self, track: Option<usize>, clip: Option<usize>) -> bool {
        let target = match (track, clip) {
            (Some(track), Some(clip)) => Some((track, clip)),
            _ => self.choose_clip_at_position(self.position, track),
        };
        let Some((track, clip)) = target else {
            return false;
        };
        self.current_track = track;
        if !self.unlocked(track) {
            return false;
        }
        if self.model().is_transition_at(track, clip) {
            self.emit(TimelineEvent::StatusMessage("You cannot split a transition.".into()));
            return false;
        }
        self.push(SplitCommand::new(track, clip, self.position))
    }

    /// Trim the clip under the playhead so its in or out point lands on
    /// the playhead.
    pub fn trim_clip_at_playhead(&mut self, location: TrimLocation, ripple: bool) -> bool {
        let Some((track, clip)) = self.choose_clip_at_position(self.position, Some(self.current_track)) else {
            return false;
        };
        self.current_track = track;
        let Some(info) = self.clip_info(track, clip) else {
            return false;
        };
        match location {
            TrimLocation::InPoint => {
                let landed = self.push(TrimClipInCommand::new(track, clip, info.start - self.position, ripple));
                if landed && ripple {
                    self.set_position(info.start);
                }
                landed
            }
            TrimLocation::OutPoint => {
                let delta = self.position - info.end();
                self.push(TrimClipOutCommand::new(track, clip, delta, ripple))
            }
        }
    }

    /// Move a clip's in point `delta` frames outward. Without ripple, an
    /// overlap with the previous clip becomes a transition; next to an
    /// existing transition the transition's edge moves instead.
    pub fn trim_clip_in(&mut self, track: usize, clip: usize, delta: i32, ripple: bool) -> bool {
        if !self.unlocked(track) {
            return false;
        }
        let model = self.model();
        if !ripple && model.add_transition_by_trim_in_valid(track, clip, delta) {
            self.push(AddTransitionByTrimInCommand::new(track, clip, delta))
        } else if model.trim_transition_out_valid(track, clip, delta) {
            self.push(TrimTransitionOutCommand::new(track, clip, delta))
        } else if model.trim_clip_in_valid(track, clip, delta, ripple) {
            self.push(TrimClipInCommand::new(track, clip, delta, ripple))
        } else {
            debug!(track, clip, delta, ripple, "trim in rejected");
            false
        }
    }

    /// Mirror of [`TimelineEditor::trim_clip_in`] for the out point.
    pub fn trim_clip_out(&mut self, track: usize, clip: usize, delta: i32, ripple: bool) -> bool {
        if !self.unlocked(track) {
            return false;
        }
        let model = self.model();
        if !ripple && model.add_transition_by_trim_out_valid(track, clip, delta) {
            self.push(AddTransitionByTrimOutCommand::new(track, clip, delta))
        } else if model.trim_transition_in_valid(track, clip, delta) {
            self.push(TrimTransitionInCommand::new(track, clip, delta))
        } else if model.trim_clip_out_valid(track, clip, delta, ripple) {
            self.push(TrimClipOutCommand::new(track, clip, delta, ripple))
        } else {
            debug!(track, clip, delta, ripple, "trim out rejected");
            false
        }
    }

    pub fn fade_in(&mut self, track: usize, clip: usize, duration: i32) -> bool {
        if !self.unlocked(track) || duration < 0 {
            return false;
        }
        let landed = self.push(FadeInCommand::new(track, clip, duration));
        if landed {
            self.emit(TimelineEvent::FadeInChanged(duration));
        }
        landed
    }

    pub fn fade_out(&mut self, track: usize, clip: usize, duration: i32) -> bool {
        if !self.unlocked(track) || duration < 0 {
            return false;
        }
        let landed = self.push(FadeOutCommand::new(track, clip, duration));
        if landed {
            self.emit(TimelineEvent::FadeOutChanged(duration));
        }
        landed
    }

    // -----------------------------------------------------------------------
    // Drag and drop
    // -----------------------------------------------------------------------

    /// Pull `position` onto the nearest edit point within the configured
    /// snap distance. `exclude` is the clip being dragged.
    pub fn snap_position(&self, position: i32, exclude: Option<(usize, usize)>) -> i32 {
        let threshold = self.config.snap_threshold;
        if threshold <= 0 {
            return position;
        }
        let points = collect_edit_points(self.model(), exclude);
        find_snap_point(position, &points, threshold)
    }

    /// Drop a dragged clip at `position` on `to_track`: a plain move when
    /// the space is free, else a transition with the previous clip, else a
    /// ripple insert at the nearer edge of the clip underneath.
    pub fn move_clip(&mut self, from_track: usize, to_track: usize, clip: usize, position: i32) -> bool {
        if !self.unlocked(from_track) || !self.unlocked(to_track) {
            self.emit(TimelineEvent::DropRejected { track: to_track });
            return false;
        }
        let position = self.snap_position(position, Some((from_track, clip)));
        let model = self.model();

        let landed_at = if model.move_clip_valid(from_track, to_track, clip, position) {
            self.push(MoveClipCommand::new(from_track, to_track, clip, position))
                .then(|| {
                    self.select_clip_at_position(to_track, position);
                    position
                })
        } else if model.add_transition_valid(from_track, to_track, clip, position) {
            self.push(AddTransitionCommand::new(from_track, clip, position))
                .then(|| {
                    self.emit_selected_from_selection();
                    position
                })
        } else if let Some(insert_at) = model.move_insert_clip_valid(from_track, to_track, clip, position) {
            self.push(MoveInsertClipCommand::new(from_track, to_track, clip, position))
                .then(|| {
                    self.select_clip_at_position(to_track, insert_at);
                    insert_at
                })
        } else {
            None
        };

        match landed_at {
            Some(at) => {
                let clip = self.clip_index_at_position(Some(to_track), at).unwrap_or(clip);
                self.emit(TimelineEvent::DropAccepted { track: to_track, clip });
                true
            }
            None => {
                debug!(from_track, to_track, clip, position, "drop rejected");
                self.emit(TimelineEvent::DropRejected { track: to_track });
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Clip content
    // -----------------------------------------------------------------------

    /// The properties panel replaced the selected clip's producer. In and
    /// out points, and those of attached filters, follow a speed change so
    /// the clip covers the same media; neighbouring transitions are folded
    /// into the new content.
    pub fn on_producer_changed(&mut self, mut after: Producer) -> bool {
        let track = self.current_track;
        let Some(&clip) = self.selection().clips().first() else {
            return false;
        };
        if self.pending_update.is_none() || !after.is_valid() {
            return false;
        }
        if !self.unlocked(track) {
            return false;
        }
        let Some(mut update) = self.pending_update.take() else {
            return false;
        };

        if RESCALED_SERVICES.contains(&after.service.as_str()) {
            let Some(info) = self.clip_info(track, clip) else {
                return false;
            };
            let ratio = info.producer.warp_speed() / after.warp_speed();
            let length = round_half_up(f64::from(info.length) * ratio);
            let mut frame_in = round_half_up(f64::from(info.frame_in) * ratio);
            let mut frame_out = round_half_up(f64::from(info.frame_out) * ratio);

            let model = self.model();
            let previous = clip > 0 && model.is_transition_at(track, clip - 1);
            let next = model.is_transition_at(track, clip + 1);
            if previous || next {
                let transition_length = |index: usize| {
                    model.clip_info(track, index).map_or(0, |i| i.frame_count)
                };
                let before = if previous { transition_length(clip - 1) } else { 0 };
                let after_len = if next { transition_length(clip + 1) } else { 0 };
                frame_in = round_half_up(f64::from(info.frame_in - before) * ratio);
                frame_out = round_half_up(f64::from(info.frame_out + after_len) * ratio);
                update.set_speed_changed(true);
            }

            after.length = length;
            after.set_in_and_out(frame_in.min(length - 1), frame_out.min(length - 1));
            for filter in after.filters.iter_mut().filter(|f| !f.is_loader()) {
                let filter_in = round_half_up(f64::from(filter.get_in()) * ratio).min(length - 1);
                let filter_out = round_half_up(f64::from(filter.get_out()) * ratio).min(length - 1);
                filter.set_in_and_out(filter_in, filter_out);
            }
        }

        match after.to_text() {
            Ok(xml) => update.set_xml_after(xml),
            Err(e) => {
                warn!(error = %e, "cannot serialize changed producer");
                return false;
            }
        }
        self.set_selection(Selection::track(track));
        let clip = update.clip;
        let landed = self.push(update);
        if landed {
            self.emit(TimelineEvent::ClipContentChanged { track, clip });
        }
        landed
    }

    /// Filters on the selected clip changed outside the command layer.
    pub fn attached_filter_changed(&self) {
        if let Some(&clip) = self.selection().clips().first() {
            self.model().attached_filter_changed(self.current_track, clip);
        }
    }

    /// Ask for the clip's audio levels to be recomputed.
    pub fn remake_audio_levels(&self, track: usize, clip: usize) {
        if self.producer_for_clip(track, clip).is_some() {
            self.emit(TimelineEvent::ClipContentChanged { track, clip });
        }
    }

    // -----------------------------------------------------------------------
    // Tracks
    // -----------------------------------------------------------------------

    fn add_track(&mut self, kind: TrackKind) -> bool {
        let landed = self.push(AddTrackCommand::new(kind));
        if landed {
            self.emit(TimelineEvent::TracksChanged);
        }
        landed
    }

    pub fn add_audio_track(&mut self) -> bool {
        self.add_track(TrackKind::Audio)
    }

    pub fn add_video_track(&mut self) -> bool {
        self.add_track(TrackKind::Video)
    }

    pub fn add_filter_track(&mut self) -> bool {
        self.add_track(TrackKind::Filter)
    }

    pub fn add_text_track(&mut self) -> bool {
        self.add_track(TrackKind::Text)
    }

    /// Remove the current track. The default video and audio tracks stay.
    pub fn remove_track(&mut self) -> bool {
        let track = self.current_track;
        if !self.model().remove_track_valid(track) || !self.unlocked(track) {
            return false;
        }
        let landed = self.push(RemoveTrackCommand::new(track));
        if landed {
            self.current_track = track.min(self.model().track_count().saturating_sub(1));
            self.emit(TimelineEvent::TracksChanged);
        }
        landed
    }

    pub fn set_track_name(&mut self, track: usize, name: &str) -> bool {
        let Some(old) = self.model().track_name(track).map(str::to_string) else {
            return false;
        };
        self.push(NameTrackCommand::new(track, name.to_string(), old))
    }

    pub fn toggle_track_mute(&mut self, track: usize) -> bool {
        let old = self.model().is_track_muted(track);
        self.push(MuteTrackCommand::new(track, !old, old))
    }

    pub fn toggle_track_hidden(&mut self, track: usize) -> bool {
        let old = self.model().is_track_hidden(track);
        self.push(HideTrackCommand::new(track, !old, old))
    }

    pub fn set_track_composite(&mut self, track: usize, composite: bool) -> bool {
        let old = self.model().is_track_composite(track);
        self.push(CompositeTrackCommand::new(track, composite, old))
    }

    pub fn set_track_lock(&mut self, track: usize, locked: bool) -> bool {
        let old = self.is_track_locked(track);
        self.push(LockTrackCommand::new(track, locked, old))
    }

    pub fn set_blend_mode(&mut self, track: usize, mode: &str) -> bool {
        let old = self.model().blend_mode(track).map(str::to_string);
        self.push(ChangeBlendModeCommand::new(track, mode.to_string(), old))
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    pub fn seek_previous_edit(&mut self) {
        if !self.is_active() {
            return;
        }
        let target = previous_edit(self.model(), self.position).unwrap_or(0);
        if target != self.position {
            self.set_position(target);
        }
    }

    pub fn seek_next_edit(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Some(target) = next_edit(self.model(), self.position) {
            if target != self.position {
                self.set_position(target);
            }
        }
    }

    /// Jump to the start of `clip` on the current track.
    pub fn seek_in_point(&mut self, clip: usize) {
        if !self.is_active() {
            return;
        }
        let Some(start) = self.clip_info(self.current_track, clip).map(|i| i.start) else {
            return;
        };
        if start != self.position {
            self.set_position(start);
        }
    }

    /// Seek to a frame given relative to the selected clip's start.
    pub fn seek_to_key_frame(&mut self, offset: i32) {
        if let Some(start) = self.selected_clip_info().map(|i| i.start) {
            self.set_position(start + offset);
        }
    }

    /// A filter panel moved its own playhead, given relative to the
    /// selected clip on the current track.
    pub fn change_position_from_filter(&mut self, offset: i32) {
        let Some(&clip) = self.selection().clips().first() else {
            return;
        };
        if let Some(start) = self.clip_info(self.current_track, clip).map(|i| i.start) {
            self.set_position(start + offset);
        }
    }

    fn selected_clip_info(&self) -> Option<ClipInfo> {
        let (track, clip) = self.selected_clip()?;
        self.clip_info(track, clip)
    }

    /// Playhead offset inside the selected clip, if it is over that clip.
    pub fn position_in_current_clip(&self) -> Option<i32> {
        let info = self.selected_clip_info()?;
        (info.start..info.end())
            .contains(&self.position)
            .then(|| self.position - info.start)
    }

    pub fn current_clip_length(&self) -> Option<i32> {
        self.selected_clip_info().map(|i| i.frame_count)
    }

    /// Length of the media behind the selected clip.
    pub fn current_clip_parent_length(&self) -> Option<i32> {
        self.selected_clip_info().map(|i| i.length)
    }

    /// Convert a clip-relative frame to a frame of the clip's media.
    pub fn position_on_parent_producer(&self, position: i32) -> Option<i32> {
        self.selected_clip_info()
            .map(|i| position + i.frame_in.max(0))
    }

    /// Convert a frame of the clip's media to a clip-relative frame.
    pub fn position_on_clip(&self, position: i32) -> Option<i32> {
        self.selected_clip_info()
            .map(|i| position - i.frame_in.max(0))
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        let selection = self.selection().clone();
        let tracks = self.model().track_count();
        match self.history.undo(&mut self.timeline) {
            Ok(()) => {
                self.after_history(selection, tracks);
                true
            }
            Err(e) => {
                debug!(error = %e, "undo unavailable");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        let selection = self.selection().clone();
        let tracks = self.model().track_count();
        match self.history.redo(&mut self.timeline) {
            Ok(()) => {
                self.after_history(selection, tracks);
                true
            }
            Err(e) => {
                debug!(error = %e, "redo unavailable");
                false
            }
        }
    }

    fn after_history(&mut self, selection: Selection, tracks: usize) {
        if self.model().track_count() != tracks {
            self.current_track = self
                .current_track
                .min(self.model().track_count().saturating_sub(1));
            self.emit(TimelineEvent::TracksChanged);
        }
        if *self.selection() != selection && self.selection().has_clips() {
            self.emit_selected_from_selection();
        }
        self.clear_selection_if_invalid(true);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
