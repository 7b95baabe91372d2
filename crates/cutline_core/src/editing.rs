use crate::error::{invalid, CoreError, Result};
use crate::model::{MultitrackModel, TrackKind};
use crate::playlist::Playlist;
use crate::producer::{
    Filter, Producer, FADE_IN_AUDIO_SERVICE, FADE_IN_VIDEO_SERVICE, FADE_OUT_AUDIO_SERVICE,
    FADE_OUT_VIDEO_SERVICE,
};
use crate::validity::is_media;
use std::ops::Range;
use tracing::debug;

/// Transition kind used for transitions created by drag or trim gestures.
pub const DEFAULT_TRANSITION: &str = "dissolve";

/// Which neighbour takes back a removed transition's frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absorb {
    Outgoing,
    Incoming,
}

fn check_media(producer: &Producer) -> Result<()> {
    if !producer.is_valid() || !is_media(producer) {
        return Err(CoreError::InvalidProducer(producer.service.clone()));
    }
    Ok(())
}

/// Place `producer` at `position`, replacing whatever was there.
fn overwrite_region(playlist: &mut Playlist, position: i32, producer: Producer) -> usize {
    let length = producer.get_playtime();
    if position >= playlist.get_playtime() {
        playlist.pad_to(position);
        playlist.append(producer);
    } else {
        playlist.split_at(position);
        playlist.split_at(position + length);
        let first = playlist
            .get_clip_index_at(position)
            .unwrap_or(playlist.count());
        let mut removed = 0;
        while removed < length && first < playlist.count() {
            removed += playlist.clip_length(first);
            playlist.remove(first);
        }
        playlist.insert(first, producer);
    }
    playlist.tidy();
    playlist.get_clip_index_at(position).unwrap_or(0)
}

/// Place `producer` at `position`, pushing later slots right.
fn insert_region(playlist: &mut Playlist, position: i32, producer: Producer) -> usize {
    if position >= playlist.get_playtime() {
        playlist.pad_to(position);
        playlist.append(producer);
    } else {
        playlist.split_at(position);
        let index = playlist
            .get_clip_index_at(position)
            .unwrap_or(playlist.count());
        playlist.insert(index, producer);
    }
    playlist.tidy();
    playlist.get_clip_index_at(position).unwrap_or(0)
}

fn lift_slot(playlist: &mut Playlist, clip: usize) {
    let length = playlist.clip_length(clip);
    if let Some(slot) = playlist.clip_mut(clip) {
        *slot = Producer::blank(length);
    }
    playlist.tidy();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeEdge {
    In,
    Out,
}

fn slot_mut(playlist: &mut Playlist, track: usize, clip: usize) -> Result<&mut Producer> {
    playlist
        .clip_mut(clip)
        .ok_or(CoreError::ClipNotFound { track, clip })
}

impl MultitrackModel {
    pub fn append(&mut self, track: usize, producer: Producer) -> Result<usize> {
        check_media(&producer)?;
        let playlist = self.playlist_mut(track)?;
        let index = playlist.append(producer);
        debug!(track, clip = index, "appended");
        Ok(index)
    }

    pub fn insert(&mut self, track: usize, position: i32, producer: Producer) -> Result<usize> {
        check_media(&producer)?;
        if !self.insert_valid(track, position) {
            return Err(invalid(format!("cannot insert on track {track} at {position}")));
        }
        Ok(insert_region(self.playlist_mut(track)?, position, producer))
    }

    pub fn overwrite(&mut self, track: usize, position: i32, producer: Producer) -> Result<usize> {
        check_media(&producer)?;
        if !self.overwrite_valid(track, position, producer.get_playtime()) {
            return Err(invalid(format!("cannot overwrite track {track} at {position}")));
        }
        Ok(overwrite_region(self.playlist_mut(track)?, position, producer))
    }

    /// Delete a slot and close the gap.
    pub fn remove_clip(&mut self, track: usize, clip: usize) -> Result<()> {
        if !self.remove_valid(track, clip) {
            return Err(invalid(format!("cannot remove clip {clip} on track {track}")));
        }
        let playlist = self.playlist_mut(track)?;
        playlist.remove(clip);
        playlist.tidy();
        Ok(())
    }

    /// Replace a clip with blank of the same length.
    pub fn lift_clip(&mut self, track: usize, clip: usize) -> Result<()> {
        if !self.lift_valid(track, clip) {
            return Err(invalid(format!("cannot lift clip {clip} on track {track}")));
        }
        lift_slot(self.playlist_mut(track)?, clip);
        Ok(())
    }

    /// Returns the clip's index on the destination track.
    pub fn move_clip(&mut self, from_track: usize, to_track: usize, clip: usize, position: i32) -> Result<usize> {
        if !self.move_clip_valid(from_track, to_track, clip, position) {
            return Err(invalid(format!("cannot move clip {clip} to {position}")));
        }
        let producer = self
            .producer_for_clip(from_track, clip)
            .cloned()
            .ok_or(CoreError::ClipNotFound { track: from_track, clip })?;
        lift_slot(self.playlist_mut(from_track)?, clip);
        Ok(overwrite_region(self.playlist_mut(to_track)?, position, producer))
    }

    /// Lift the clip and ripple-insert it at the edge chosen by
    /// [`MultitrackModel::move_insert_clip_valid`].
    pub fn move_insert_clip(&mut self, from_track: usize, to_track: usize, clip: usize, position: i32) -> Result<usize> {
        let insert_at = self
            .move_insert_clip_valid(from_track, to_track, clip, position)
            .ok_or_else(|| invalid(format!("cannot insert clip {clip} near {position}")))?;
        let producer = self
            .producer_for_clip(from_track, clip)
            .cloned()
            .ok_or(CoreError::ClipNotFound { track: from_track, clip })?;
        lift_slot(self.playlist_mut(from_track)?, clip);
        Ok(insert_region(self.playlist_mut(to_track)?, insert_at, producer))
    }

    /// Drag `clip` left so it overlaps the clip before it. Slots after the
    /// dragged clip keep their positions. Returns the transition's index.
    pub fn add_transition(&mut self, track: usize, clip: usize, position: i32) -> Result<usize> {
        if !self.add_transition_valid(track, track, clip, position) {
            return Err(invalid(format!("no transition for clip {clip} at {position}")));
        }
        let playlist = self.playlist_mut(track)?;
        let prev = if playlist.is_blank(clip - 1) { clip - 2 } else { clip - 1 };
        let (Some(a), Some(b)) = (playlist.clip(prev).cloned(), playlist.clip(clip).cloned()) else {
            return Err(CoreError::ClipNotFound { track, clip });
        };
        let overlap = playlist.clip_start(prev) + a.get_playtime() - position;
        let shift = playlist.clip_start(clip) - position;

        let transition = Producer::transition(
            DEFAULT_TRANSITION,
            a.cut(a.get_out() - overlap + 1, a.get_out()),
            b.cut(b.get_in(), b.get_in() + overlap - 1),
        );
        slot_mut(playlist, track, prev)?.set_in_and_out(a.get_in(), a.get_out() - overlap);
        slot_mut(playlist, track, clip)?.set_in_and_out(b.get_in() + overlap, b.get_out());
        if prev + 1 < clip {
            playlist.remove(prev + 1);
        }
        playlist.insert(prev + 1, transition);
        playlist.insert_blank(prev + 3, shift);
        playlist.tidy();
        debug!(track, clip, position, overlap, "transition added by drag");
        Ok(prev + 1)
    }

    /// Grow `clip`'s head by `delta` into the clip before it. Returns the
    /// transition's index.
    pub fn add_transition_by_trim_in(&mut self, track: usize, clip: usize, delta: i32) -> Result<usize> {
        if !self.add_transition_by_trim_in_valid(track, clip, delta) {
            return Err(invalid(format!("no transition trimming in clip {clip} by {delta}")));
        }
        let playlist = self.playlist_mut(track)?;
        let (Some(a), Some(b)) = (playlist.clip(clip - 1).cloned(), playlist.clip(clip).cloned()) else {
            return Err(CoreError::ClipNotFound { track, clip });
        };
        let transition = Producer::transition(
            DEFAULT_TRANSITION,
            a.cut(a.get_out() - delta + 1, a.get_out()),
            b.cut(b.get_in() - delta, b.get_in() - 1),
        );
        slot_mut(playlist, track, clip - 1)?.set_in_and_out(a.get_in(), a.get_out() - delta);
        playlist.insert(clip, transition);
        Ok(clip)
    }

    /// Grow `clip`'s tail by `delta` into the clip after it. Returns the
    /// transition's index.
    pub fn add_transition_by_trim_out(&mut self, track: usize, clip: usize, delta: i32) -> Result<usize> {
        if !self.add_transition_by_trim_out_valid(track, clip, delta) {
            return Err(invalid(format!("no transition trimming out clip {clip} by {delta}")));
        }
        let playlist = self.playlist_mut(track)?;
        let (Some(a), Some(b)) = (playlist.clip(clip).cloned(), playlist.clip(clip + 1).cloned()) else {
            return Err(CoreError::ClipNotFound { track, clip });
        };
        let transition = Producer::transition(
            DEFAULT_TRANSITION,
            a.cut(a.get_out() + 1, a.get_out() + delta),
            b.cut(b.get_in(), b.get_in() + delta - 1),
        );
        slot_mut(playlist, track, clip + 1)?.set_in_and_out(b.get_in() + delta, b.get_out());
        playlist.insert(clip + 1, transition);
        Ok(clip + 1)
    }

    /// Move the boundary between `clip` and the transition after it.
    pub fn trim_transition_in(&mut self, track: usize, clip: usize, delta: i32) -> Result<()> {
        if !self.trim_transition_in_valid(track, clip, delta) {
            return Err(invalid(format!("cannot trim transition after clip {clip} by {delta}")));
        }
        let playlist = self.playlist_mut(track)?;
        let a = slot_mut(playlist, track, clip)?;
        a.set_in_and_out(a.get_in(), a.get_out() + delta);
        let t = slot_mut(playlist, track, clip + 1)?;
        let length = t.get_playtime() - delta;
        t.set_span(length);
        if let Some((a_cut, b_cut)) = t.sources_mut() {
            a_cut.set_in_and_out(a_cut.get_in() + delta, a_cut.get_out());
            b_cut.set_in_and_out(b_cut.get_in() + delta, b_cut.get_out());
        }
        Ok(())
    }

    /// Move the boundary between the transition before `clip` and `clip`.
    pub fn trim_transition_out(&mut self, track: usize, clip: usize, delta: i32) -> Result<()> {
        if !self.trim_transition_out_valid(track, clip, delta) {
            return Err(invalid(format!("cannot trim transition before clip {clip} by {delta}")));
        }
        let playlist = self.playlist_mut(track)?;
        let b = slot_mut(playlist, track, clip)?;
        b.set_in_and_out(b.get_in() - delta, b.get_out());
        let t = slot_mut(playlist, track, clip - 1)?;
        let length = t.get_playtime() - delta;
        t.set_span(length);
        if let Some((a_cut, b_cut)) = t.sources_mut() {
            a_cut.set_in_and_out(a_cut.get_in(), a_cut.get_out() - delta);
            b_cut.set_in_and_out(b_cut.get_in(), b_cut.get_out() - delta);
        }
        Ok(())
    }

    /// Remove the transition at `index`, returning its frames to one
    /// neighbour so the track length is unchanged.
    pub fn remove_transition(&mut self, track: usize, index: usize, absorb: Absorb) -> Result<()> {
        if index == 0
            || !self.is_transition_at(track, index)
            || self.media_clip(track, index - 1).is_none()
            || self.media_clip(track, index + 1).is_none()
        {
            return Err(invalid(format!("no transition at {index} on track {track}")));
        }
        let playlist = self.playlist_mut(track)?;
        let n = playlist.clip_length(index);
        match absorb {
            Absorb::Outgoing => {
                let a = slot_mut(playlist, track, index - 1)?;
                a.set_in_and_out(a.get_in(), a.get_out() + n);
            }
            Absorb::Incoming => {
                let b = slot_mut(playlist, track, index + 1)?;
                b.set_in_and_out(b.get_in() - n, b.get_out());
            }
        }
        playlist.remove(index);
        debug!(track, index, ?absorb, "transition removed");
        Ok(())
    }

    /// Fold the transitions on either side of `clip` back into it. Returns
    /// the clip's new index.
    pub fn remove_transitions_on_clip(&mut self, track: usize, clip: usize) -> Result<usize> {
        let mut clip = clip;
        if clip > 0 && self.is_transition_at(track, clip - 1) {
            self.remove_transition(track, clip - 1, Absorb::Incoming)?;
            clip -= 1;
        }
        if self.is_transition_at(track, clip + 1) {
            self.remove_transition(track, clip + 1, Absorb::Outgoing)?;
        }
        Ok(clip)
    }

    pub fn set_transition_duration(&mut self, track: usize, index: usize, duration: i32) -> Result<()> {
        if !self.set_transition_duration_valid(track, index, duration) {
            return Err(invalid(format!("cannot set transition {index} to {duration} frames")));
        }
        let playlist = self.playlist_mut(track)?;
        let diff = duration - playlist.clip_length(index);
        let a = slot_mut(playlist, track, index - 1)?;
        a.set_in_and_out(a.get_in(), a.get_out() - diff);
        let b = slot_mut(playlist, track, index + 1)?;
        b.set_in_and_out(b.get_in() + diff, b.get_out());
        let t = slot_mut(playlist, track, index)?;
        t.set_span(duration);
        if let Some((a_cut, b_cut)) = t.sources_mut() {
            a_cut.set_in_and_out(a_cut.get_in() - diff, a_cut.get_out());
            b_cut.set_in_and_out(b_cut.get_in(), b_cut.get_out() + diff);
        }
        Ok(())
    }

    /// Returns the clip's index after any blank was inserted before it.
    pub fn trim_clip_in(&mut self, track: usize, clip: usize, delta: i32, ripple: bool) -> Result<usize> {
        if !self.trim_clip_in_valid(track, clip, delta, ripple) {
            return Err(invalid(format!("cannot trim in clip {clip} by {delta}")));
        }
        let playlist = self.playlist_mut(track)?;
        let start = playlist.clip_start(clip);
        let p = slot_mut(playlist, track, clip)?;
        p.set_in_and_out(p.get_in() - delta, p.get_out());
        if !ripple {
            let gap = clip.checked_sub(1).filter(|&i| playlist.is_blank(i));
            match gap {
                Some(i) => {
                    let length = playlist.clip_length(i) - delta;
                    playlist.resize_blank(i, length);
                }
                None => playlist.insert_blank(clip, -delta),
            }
        }
        playlist.tidy();
        let new_start = if ripple { start } else { start - delta };
        playlist
            .get_clip_index_at(new_start)
            .ok_or(CoreError::ClipNotFound { track, clip })
    }

    pub fn trim_clip_out(&mut self, track: usize, clip: usize, delta: i32, ripple: bool) -> Result<()> {
        if !self.trim_clip_out_valid(track, clip, delta, ripple) {
            return Err(invalid(format!("cannot trim out clip {clip} by {delta}")));
        }
        let playlist = self.playlist_mut(track)?;
        let p = slot_mut(playlist, track, clip)?;
        p.set_in_and_out(p.get_in(), p.get_out() + delta);
        if !ripple && clip + 1 < playlist.count() {
            if playlist.is_blank(clip + 1) {
                let length = playlist.clip_length(clip + 1) - delta;
                playlist.resize_blank(clip + 1, length);
            } else {
                playlist.insert_blank(clip + 1, -delta);
            }
        }
        playlist.tidy();
        Ok(())
    }

    /// Split at an absolute track position. Returns the right half's index.
    pub fn split_clip(&mut self, track: usize, clip: usize, position: i32) -> Result<usize> {
        if !self.split_valid(track, clip, position) {
            return Err(invalid(format!("cannot split clip {clip} at {position}")));
        }
        let fade_out = self.fade_service(track, FadeEdge::Out);
        let fade_in = self.fade_service(track, FadeEdge::In);
        let playlist = self.playlist_mut(track)?;
        let offset = position - playlist.clip_start(clip);
        playlist.split(clip, offset);
        for (index, service) in [(clip, fade_out), (clip + 1, fade_in)] {
            let half = slot_mut(playlist, track, index)?;
            if let Some(f) = half.find_filter(service) {
                half.detach(f);
            }
            half.fit_filters_to_cut();
        }
        Ok(clip + 1)
    }

    pub fn fade_in(&mut self, track: usize, clip: usize, duration: i32) -> Result<()> {
        self.set_fade(track, clip, duration, FadeEdge::In)
    }

    pub fn fade_out(&mut self, track: usize, clip: usize, duration: i32) -> Result<()> {
        self.set_fade(track, clip, duration, FadeEdge::Out)
    }

    /// Audio tracks fade the volume, every other kind fades the picture.
    fn fade_service(&self, track: usize, edge: FadeEdge) -> &'static str {
        let audio = self.track(track).is_some_and(|t| t.kind == TrackKind::Audio);
        match (edge, audio) {
            (FadeEdge::In, true) => FADE_IN_AUDIO_SERVICE,
            (FadeEdge::Out, true) => FADE_OUT_AUDIO_SERVICE,
            (FadeEdge::In, false) => FADE_IN_VIDEO_SERVICE,
            (FadeEdge::Out, false) => FADE_OUT_VIDEO_SERVICE,
        }
    }

    fn set_fade(&mut self, track: usize, clip: usize, duration: i32, edge: FadeEdge) -> Result<()> {
        if !self.fade_valid(track, clip, duration) {
            return Err(invalid(format!("cannot fade clip {clip} over {duration} frames")));
        }
        let service = self.fade_service(track, edge);
        let p = slot_mut(self.playlist_mut(track)?, track, clip)?;
        let (frame_in, frame_out) = match edge {
            FadeEdge::In => (p.get_in(), p.get_in() + duration - 1),
            FadeEdge::Out => (p.get_out() - duration + 1, p.get_out()),
        };
        match p.find_filter(service) {
            Some(index) if duration == 0 => {
                p.detach(index);
            }
            Some(index) => {
                if let Some(f) = p.filter_mut(index) {
                    f.set_in_and_out(frame_in, frame_out);
                }
            }
            None if duration > 0 => p.attach(Filter::new(service, frame_in, frame_out)),
            None => {}
        }
        Ok(())
    }

    pub fn fade_in_duration(&self, track: usize, clip: usize) -> i32 {
        self.fade_duration(track, clip, FadeEdge::In)
    }

    pub fn fade_out_duration(&self, track: usize, clip: usize) -> i32 {
        self.fade_duration(track, clip, FadeEdge::Out)
    }

    fn fade_duration(&self, track: usize, clip: usize, edge: FadeEdge) -> i32 {
        let service = self.fade_service(track, edge);
        self.producer_for_clip(track, clip)
            .and_then(|p| p.find_filter(service).and_then(|i| p.filter(i)))
            .map_or(0, |f| f.get_out() - f.get_in() + 1)
    }

    /// Append every media entry of `source`. Returns the new slot range.
    pub fn append_from_playlist(&mut self, track: usize, source: &Playlist) -> Result<Range<usize>> {
        let entries: Vec<Producer> = source
            .entries
            .iter()
            .filter(|p| is_media(p))
            .cloned()
            .collect();
        if entries.is_empty() {
            return Err(invalid("playlist has no clips"));
        }
        for p in &entries {
            check_media(p)?;
        }
        let playlist = self.playlist_mut(track)?;
        let first = playlist.count();
        playlist.entries.extend(entries);
        Ok(first..playlist.count())
    }

    pub fn add_filter(&mut self, track: usize, position: i32, producer: Producer) -> Result<usize> {
        self.overlay(track, TrackKind::Filter, position, producer)
    }

    pub fn add_text(&mut self, track: usize, position: i32, producer: Producer) -> Result<usize> {
        self.overlay(track, TrackKind::Text, position, producer)
    }

    fn overlay(&mut self, track: usize, kind: TrackKind, position: i32, producer: Producer) -> Result<usize> {
        match self.track(track).map(|t| t.kind) {
            Some(actual) if actual == kind => self.overwrite(track, position, producer),
            Some(_) => Err(invalid(format!("track {track} is not a {} track", kind.as_str()))),
            None => Err(CoreError::TrackNotFound(track)),
        }
    }

    /// Swap a clip's content. A length change ripples later slots.
    pub fn replace_clip(&mut self, track: usize, clip: usize, producer: Producer) -> Result<()> {
        if !self.replace_clip_valid(track, clip, &producer) {
            return Err(invalid(format!("cannot replace clip {clip} on track {track}")));
        }
        let playlist = self.playlist_mut(track)?;
        *slot_mut(playlist, track, clip)? = producer;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
