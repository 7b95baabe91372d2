use crate::model::MultitrackModel;
use crate::playlist::Playlist;
use crate::producer::Producer;

/// Real media: neither a gap nor a transition.
pub(crate) fn is_media(p: &Producer) -> bool {
    !p.is_blank() && !p.is_transition()
}

/// True when every non-blank slot intersecting `start..end` is `ignore`.
fn region_is_free(playlist: &Playlist, start: i32, end: i32, ignore: Option<usize>) -> bool {
    let mut slot_start = 0;
    for (i, p) in playlist.entries.iter().enumerate() {
        if slot_start >= end {
            break;
        }
        let slot_end = slot_start + p.get_playtime();
        if slot_end > start && !p.is_blank() && Some(i) != ignore {
            return false;
        }
        slot_start = slot_end;
    }
    true
}

impl MultitrackModel {
    pub(crate) fn media_clip(&self, track: usize, clip: usize) -> Option<&Producer> {
        self.producer_for_clip(track, clip).filter(|p| is_media(p))
    }

    fn transition_slot(&self, track: usize, index: usize) -> Option<&Producer> {
        self.producer_for_clip(track, index)
            .filter(|p| p.is_transition())
    }

    /// A clip may move when it is free of transitions and lands on blank
    /// space (or its own current extent).
    pub fn move_clip_valid(&self, from_track: usize, to_track: usize, clip: usize, position: i32) -> bool {
        if position < 0 {
            return false;
        }
        let Some(src) = self.media_clip(from_track, clip) else {
            return false;
        };
        if self.has_adjacent_transition(from_track, clip) {
            return false;
        }
        let Some(dest) = self.playlist(to_track) else {
            return false;
        };
        let same_track = from_track == to_track;
        if same_track && dest.clip_start(clip) == position {
            return false;
        }
        region_is_free(
            dest,
            position,
            position + src.get_playtime(),
            same_track.then_some(clip),
        )
    }

    /// Dragging a clip left onto the tail of the clip before it creates a
    /// transition when the overlap is shorter than both clips.
    pub fn add_transition_valid(&self, from_track: usize, to_track: usize, clip: usize, position: i32) -> bool {
        if from_track != to_track || position < 0 || clip == 0 {
            return false;
        }
        let Some(playlist) = self.playlist(to_track) else {
            return false;
        };
        let Some(incoming) = self.media_clip(to_track, clip) else {
            return false;
        };
        if self.has_adjacent_transition(to_track, clip) {
            return false;
        }
        let prev = if playlist.is_blank(clip - 1) {
            match clip.checked_sub(2) {
                Some(p) => p,
                None => return false,
            }
        } else {
            clip - 1
        };
        let Some(outgoing) = self.media_clip(to_track, prev) else {
            return false;
        };
        let outgoing_end = playlist.clip_start(prev) + outgoing.get_playtime();
        let overlap = outgoing_end - position;
        overlap > 0 && overlap < outgoing.get_playtime() && overlap < incoming.get_playtime()
    }

    /// Ripple-insert target for a drop onto a clip: the nearer edge of the
    /// clip under `position`, or `None` when the drop cannot insert there.
    pub fn move_insert_clip_valid(&self, from_track: usize, to_track: usize, clip: usize, position: i32) -> Option<i32> {
        if position < 0 {
            return None;
        }
        let src = self.media_clip(from_track, clip)?;
        if self.has_adjacent_transition(from_track, clip) {
            return None;
        }
        let playlist = self.playlist(to_track)?;
        let target = playlist.get_clip_index_at(position)?;
        if from_track == to_track && target == clip {
            return None;
        }
        let target_clip = self.media_clip(to_track, target)?;
        let start = playlist.clip_start(target);
        let length = target_clip.get_playtime();
        let insert_at = if position - start < length / 2 {
            if target > 0 && playlist.is_transition(target - 1) {
                return None;
            }
            start
        } else {
            if playlist.is_transition(target + 1) {
                return None;
            }
            start + length
        };
        if from_track == to_track {
            let src_start = self.playlist(from_track)?.clip_start(clip);
            if insert_at == src_start || insert_at == src_start + src.get_playtime() {
                return None;
            }
        }
        Some(insert_at)
    }

    /// Moves the in point `delta` frames outward (negative shrinks).
    pub fn trim_clip_in_valid(&self, track: usize, clip: usize, delta: i32, ripple: bool) -> bool {
        if delta == 0 {
            return false;
        }
        let (Some(playlist), Some(p)) = (self.playlist(track), self.media_clip(track, clip)) else {
            return false;
        };
        if clip > 0 && playlist.is_transition(clip - 1) {
            return false;
        }
        let new_in = p.get_in() - delta;
        if new_in < 0 || new_in > p.get_out() {
            return false;
        }
        if !ripple && delta > 0 {
            return clip > 0 && playlist.is_blank(clip - 1) && playlist.clip_length(clip - 1) >= delta;
        }
        true
    }

    /// Moves the out point `delta` frames outward (negative shrinks).
    pub fn trim_clip_out_valid(&self, track: usize, clip: usize, delta: i32, ripple: bool) -> bool {
        if delta == 0 {
            return false;
        }
        let (Some(playlist), Some(p)) = (self.playlist(track), self.media_clip(track, clip)) else {
            return false;
        };
        if playlist.is_transition(clip + 1) {
            return false;
        }
        let new_out = p.get_out() + delta;
        if new_out < p.get_in() || new_out >= p.get_length() {
            return false;
        }
        if !ripple && delta > 0 {
            return clip + 1 >= playlist.count()
                || (playlist.is_blank(clip + 1) && playlist.clip_length(clip + 1) >= delta);
        }
        true
    }

    /// Growing a clip's head into the clip before it by `delta` frames
    /// becomes a transition of that length.
    pub fn add_transition_by_trim_in_valid(&self, track: usize, clip: usize, delta: i32) -> bool {
        if delta <= 0 || clip == 0 {
            return false;
        }
        let (Some(outgoing), Some(incoming)) =
            (self.media_clip(track, clip - 1), self.media_clip(track, clip))
        else {
            return false;
        };
        incoming.get_in() - delta >= 0 && delta < outgoing.get_playtime()
    }

    /// Growing a clip's tail into the clip after it by `delta` frames
    /// becomes a transition of that length.
    pub fn add_transition_by_trim_out_valid(&self, track: usize, clip: usize, delta: i32) -> bool {
        if delta <= 0 {
            return false;
        }
        let (Some(outgoing), Some(incoming)) =
            (self.media_clip(track, clip), self.media_clip(track, clip + 1))
        else {
            return false;
        };
        outgoing.get_out() + delta < outgoing.get_length() && delta < incoming.get_playtime()
    }

    /// Growing `clip`'s out point by `delta` into the transition after it.
    pub fn trim_transition_in_valid(&self, track: usize, clip: usize, delta: i32) -> bool {
        if delta == 0 {
            return false;
        }
        let (Some(outgoing), Some(t)) = (self.media_clip(track, clip), self.transition_slot(track, clip + 1)) else {
            return false;
        };
        let Some(b_cut) = t.incoming() else {
            return false;
        };
        t.get_playtime() - delta > 0
            && outgoing.get_out() + delta >= outgoing.get_in()
            && b_cut.get_in() + delta >= 0
    }

    /// Growing `clip`'s in point by `delta` into the transition before it.
    pub fn trim_transition_out_valid(&self, track: usize, clip: usize, delta: i32) -> bool {
        if delta == 0 || clip == 0 {
            return false;
        }
        let (Some(incoming), Some(t)) = (self.media_clip(track, clip), self.transition_slot(track, clip - 1)) else {
            return false;
        };
        let Some(a_cut) = t.outgoing() else {
            return false;
        };
        let new_in = incoming.get_in() - delta;
        t.get_playtime() - delta > 0
            && new_in >= 0
            && new_in <= incoming.get_out()
            && a_cut.get_out() - delta < a_cut.get_length()
    }

    pub fn set_transition_duration_valid(&self, track: usize, transition: usize, duration: i32) -> bool {
        if duration < 1 || transition == 0 {
            return false;
        }
        let Some(t) = self.transition_slot(track, transition) else {
            return false;
        };
        let (Some(outgoing), Some(incoming)) = (
            self.media_clip(track, transition - 1),
            self.media_clip(track, transition + 1),
        ) else {
            return false;
        };
        let diff = duration - t.get_playtime();
        outgoing.get_out() - diff >= outgoing.get_in() && incoming.get_in() + diff <= incoming.get_out()
    }

    pub fn split_valid(&self, track: usize, clip: usize, position: i32) -> bool {
        let (Some(playlist), Some(p)) = (self.playlist(track), self.media_clip(track, clip)) else {
            return false;
        };
        let start = playlist.clip_start(clip);
        position > start && position < start + p.get_playtime()
    }

    /// Inserting may split a clip but never a transition or its binding.
    pub fn insert_valid(&self, track: usize, position: i32) -> bool {
        let Some(playlist) = self.playlist(track) else {
            return false;
        };
        if position < 0 {
            return false;
        }
        match playlist.get_clip_index_at(position) {
            None => true,
            Some(i) => {
                !playlist.is_transition(i)
                    && !(i > 0 && position == playlist.clip_start(i) && playlist.is_transition(i - 1))
            }
        }
    }

    pub fn overwrite_valid(&self, track: usize, position: i32, length: i32) -> bool {
        let Some(playlist) = self.playlist(track) else {
            return false;
        };
        if position < 0 || length <= 0 {
            return false;
        }
        let end = position + length;
        let mut slot_start = 0;
        for (i, p) in playlist.entries.iter().enumerate() {
            if slot_start >= end {
                break;
            }
            let slot_end = slot_start + p.get_playtime();
            if slot_end > position && (p.is_transition() || self.has_adjacent_transition(track, i)) {
                return false;
            }
            slot_start = slot_end;
        }
        true
    }

    /// Remove and lift need the clip's transitions cleared first.
    pub fn remove_valid(&self, track: usize, clip: usize) -> bool {
        self.producer_for_clip(track, clip)
            .is_some_and(|p| !p.is_transition())
            && !self.has_adjacent_transition(track, clip)
    }

    pub fn lift_valid(&self, track: usize, clip: usize) -> bool {
        self.media_clip(track, clip).is_some() && !self.has_adjacent_transition(track, clip)
    }

    pub fn fade_valid(&self, track: usize, clip: usize, duration: i32) -> bool {
        self.media_clip(track, clip)
            .is_some_and(|p| duration >= 0 && duration <= p.get_playtime())
    }

    /// Same-length replacements may keep neighbouring transitions; anything
    /// else needs them cleared.
    pub fn replace_clip_valid(&self, track: usize, clip: usize, producer: &Producer) -> bool {
        let Some(current) = self.media_clip(track, clip) else {
            return false;
        };
        producer.is_valid()
            && is_media(producer)
            && (producer.get_playtime() == current.get_playtime() || !self.has_adjacent_transition(track, clip))
    }
}
