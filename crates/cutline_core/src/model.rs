use crate::error::{invalid, CoreError, Result};
use crate::events::{EventBus, TimelineEvent};
use crate::playlist::{ClipInfo, Playlist};
use crate::producer::{Producer, PropertyAccess};
use crate::profile::Profile;
use crate::tractor::{TrackTransition, Tractor, BLEND_MODE_PROPERTY, DISABLE_PROPERTY};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const TRACK_NAME_PROPERTY: &str = "cutline:name";
pub const TRACK_KIND_PROPERTY: &str = "cutline:kind";
pub const TRACK_MUTE_PROPERTY: &str = "cutline:mute";
pub const TRACK_HIDE_PROPERTY: &str = "cutline:hide";
pub const TRACK_LOCK_PROPERTY: &str = "cutline:lock";

/// Engine index of the black background playlist every track composites over.
pub const BACKGROUND_TRACK: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Filter,
    Text,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Filter => "filter",
            TrackKind::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(TrackKind::Video),
            "audio" => Some(TrackKind::Audio),
            "filter" => Some(TrackKind::Filter),
            "text" => Some(TrackKind::Text),
            _ => None,
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            TrackKind::Video => "V",
            TrackKind::Audio => "A",
            TrackKind::Filter => "F",
            TrackKind::Text => "T",
        }
    }

    /// UI row grouping: text and filter tracks sit above video, audio below.
    fn row_group(&self) -> u8 {
        match self {
            TrackKind::Text => 0,
            TrackKind::Filter => 1,
            TrackKind::Video => 2,
            TrackKind::Audio => 3,
        }
    }
}

/// A UI-visible track row and where it lives in the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    /// 0-based ordinal among tracks of the same kind; 0 is the default pair.
    pub number: usize,
    pub mlt_index: usize,
}

/// True when slot `clip` of `playlist` is a transition.
pub fn is_transition(playlist: &Playlist, clip: usize) -> bool {
    playlist.is_transition(clip)
}

/// The ordered collection of tracks making up one composition.
#[derive(Debug, Clone)]
pub struct MultitrackModel {
    profile: Profile,
    tractor: Tractor,
    track_list: Vec<Track>,
    composition_id: Uuid,
    events: EventBus,
}

impl MultitrackModel {
    /// A fresh composition with the default video and audio tracks.
    pub fn new(profile: Profile, events: EventBus) -> Self {
        let mut tractor = Tractor::new();
        let mut background = Playlist::new();
        background.set(TRACK_NAME_PROPERTY, "background");
        tractor.append_track(background);

        let mut model = Self {
            profile,
            tractor,
            track_list: Vec::new(),
            composition_id: Uuid::new_v4(),
            events,
        };
        model.push_track(TrackKind::Video);
        model.push_track(TrackKind::Audio);
        model.rebuild_track_list();
        model
    }

    /// Load a composition from interchange text.
    pub fn from_text(profile: Profile, text: &str, events: EventBus) -> Result<Self> {
        let tractor = Tractor::from_text(text)?;
        if tractor.count() == 0 {
            return Err(invalid("composition has no background track"));
        }
        for (i, playlist) in tractor.tracks.iter().enumerate() {
            if let Some(bad) = playlist.entries.iter().find(|p| !p.is_valid()) {
                return Err(CoreError::InvalidProducer(format!(
                    "track {i}: {} in={} out={}",
                    bad.service, bad.frame_in, bad.frame_out
                )));
            }
        }
        let mut model = Self {
            profile,
            tractor,
            track_list: Vec::new(),
            composition_id: Uuid::new_v4(),
            events,
        };
        model.rebuild_track_list();
        Ok(model)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn tractor(&self) -> &Tractor {
        &self.tractor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn composition_id(&self) -> Uuid {
        self.composition_id
    }

    pub fn to_text(&self) -> Result<String> {
        self.tractor.to_text()
    }

    // -----------------------------------------------------------------------
    // Track list
    // -----------------------------------------------------------------------

    pub fn track_list(&self) -> &[Track] {
        &self.track_list
    }

    pub fn track_count(&self) -> usize {
        self.track_list.len()
    }

    pub fn track(&self, track: usize) -> Option<&Track> {
        self.track_list.get(track)
    }

    fn kind_of(playlist: &Playlist) -> TrackKind {
        playlist
            .get(TRACK_KIND_PROPERTY)
            .and_then(TrackKind::parse)
            .unwrap_or(TrackKind::Video)
    }

    pub(crate) fn rebuild_track_list(&mut self) {
        let mut counts = [0usize; 4];
        let mut tracks: Vec<Track> = self
            .tractor
            .tracks
            .iter()
            .enumerate()
            .skip(BACKGROUND_TRACK + 1)
            .map(|(mlt_index, playlist)| {
                let kind = Self::kind_of(playlist);
                let slot = &mut counts[kind.row_group() as usize];
                let number = *slot;
                *slot += 1;
                Track {
                    kind,
                    number,
                    mlt_index,
                }
            })
            .collect();
        tracks.sort_by(|a, b| {
            a.kind.row_group().cmp(&b.kind.row_group()).then_with(|| {
                if a.kind == TrackKind::Audio {
                    a.mlt_index.cmp(&b.mlt_index)
                } else {
                    b.mlt_index.cmp(&a.mlt_index)
                }
            })
        });
        self.track_list = tracks;
    }

    fn push_track(&mut self, kind: TrackKind) -> usize {
        let number = self
            .tractor
            .tracks
            .iter()
            .skip(BACKGROUND_TRACK + 1)
            .filter(|pl| Self::kind_of(pl) == kind)
            .count();
        let mut playlist = Playlist::new();
        playlist.set(TRACK_KIND_PROPERTY, kind.as_str());
        playlist.set(
            TRACK_NAME_PROPERTY,
            format!("{}{}", kind.name_prefix(), number + 1),
        );
        let mlt_index = self.tractor.append_track(playlist);
        if kind == TrackKind::Video {
            self.tractor
                .add_transition(TrackTransition::blend(BACKGROUND_TRACK, mlt_index));
        }
        mlt_index
    }

    /// Add a track of `kind`, returning its UI row.
    pub fn add_track(&mut self, kind: TrackKind) -> usize {
        let mlt_index = self.push_track(kind);
        self.rebuild_track_list();
        debug!(kind = kind.as_str(), mlt_index, "track added");
        self.track_list
            .iter()
            .position(|t| t.mlt_index == mlt_index)
            .unwrap_or(0)
    }

    pub fn remove_track_valid(&self, track: usize) -> bool {
        self.track(track).is_some_and(|t| t.number > 0)
    }

    pub fn remove_track(&mut self, track: usize) -> Result<()> {
        if !self.remove_track_valid(track) {
            return Err(invalid(format!("track {track} cannot be removed")));
        }
        let mlt_index = self.mlt_index(track)?;
        self.tractor.remove_track(mlt_index);
        self.rebuild_track_list();
        debug!(track, mlt_index, "track removed");
        Ok(())
    }

    pub(crate) fn mlt_index(&self, track: usize) -> Result<usize> {
        self.track(track)
            .map(|t| t.mlt_index)
            .ok_or(CoreError::TrackNotFound(track))
    }

    pub fn playlist(&self, track: usize) -> Option<&Playlist> {
        self.track(track)
            .and_then(|t| self.tractor.track(t.mlt_index))
    }

    pub(crate) fn playlist_mut(&mut self, track: usize) -> Result<&mut Playlist> {
        let mlt_index = self.mlt_index(track)?;
        self.tractor
            .track_mut(mlt_index)
            .ok_or(CoreError::TrackNotFound(track))
    }

    // -----------------------------------------------------------------------
    // Slot queries
    // -----------------------------------------------------------------------

    pub fn duration(&self) -> i32 {
        self.tractor.get_length()
    }

    pub fn clip_count(&self, track: usize) -> usize {
        self.playlist(track).map_or(0, Playlist::count)
    }

    pub fn producer_for_clip(&self, track: usize, clip: usize) -> Option<&Producer> {
        self.playlist(track).and_then(|pl| pl.clip(clip))
    }

    pub fn clip_info(&self, track: usize, clip: usize) -> Option<ClipInfo> {
        self.playlist(track).and_then(|pl| pl.clip_info(clip))
    }

    pub fn clip_index_at(&self, track: usize, position: i32) -> Option<usize> {
        self.playlist(track)
            .and_then(|pl| pl.get_clip_index_at(position))
    }

    pub fn is_blank(&self, track: usize, clip: usize) -> bool {
        self.playlist(track).is_some_and(|pl| pl.is_blank(clip))
    }

    pub fn is_transition_at(&self, track: usize, clip: usize) -> bool {
        self.playlist(track)
            .is_some_and(|pl| is_transition(pl, clip))
    }

    /// Whether a transition sits directly before or after `clip`.
    pub fn has_adjacent_transition(&self, track: usize, clip: usize) -> bool {
        (clip > 0 && self.is_transition_at(track, clip - 1))
            || self.is_transition_at(track, clip + 1)
    }

    // -----------------------------------------------------------------------
    // Track metadata
    // -----------------------------------------------------------------------

    fn flag(&self, track: usize, key: &str) -> bool {
        self.playlist(track).is_some_and(|pl| pl.get_int(key) != 0)
    }

    fn set_flag(&mut self, track: usize, key: &str, value: bool) -> Result<()> {
        let playlist = self.playlist_mut(track)?;
        if value {
            playlist.set(key, 1);
        } else {
            playlist.clear(key);
        }
        Ok(())
    }

    pub fn track_name(&self, track: usize) -> Option<&str> {
        self.playlist(track).and_then(|pl| pl.get(TRACK_NAME_PROPERTY))
    }

    pub fn set_track_name(&mut self, track: usize, name: &str) -> Result<()> {
        self.playlist_mut(track)?.set(TRACK_NAME_PROPERTY, name);
        Ok(())
    }

    pub fn is_track_locked(&self, track: usize) -> bool {
        self.flag(track, TRACK_LOCK_PROPERTY)
    }

    pub fn set_track_lock(&mut self, track: usize, locked: bool) -> Result<()> {
        self.set_flag(track, TRACK_LOCK_PROPERTY, locked)
    }

    pub fn is_track_muted(&self, track: usize) -> bool {
        self.flag(track, TRACK_MUTE_PROPERTY)
    }

    pub fn set_track_mute(&mut self, track: usize, muted: bool) -> Result<()> {
        self.set_flag(track, TRACK_MUTE_PROPERTY, muted)
    }

    pub fn is_track_hidden(&self, track: usize) -> bool {
        self.flag(track, TRACK_HIDE_PROPERTY)
    }

    pub fn set_track_hidden(&mut self, track: usize, hidden: bool) -> Result<()> {
        self.set_flag(track, TRACK_HIDE_PROPERTY, hidden)
    }

    fn compositing(&self, track: usize) -> Option<&TrackTransition> {
        let mlt_index = self.track(track)?.mlt_index;
        self.tractor.transition_for_track(mlt_index)
    }

    fn compositing_mut(&mut self, track: usize) -> Result<&mut TrackTransition> {
        let mlt_index = self.mlt_index(track)?;
        self.tractor
            .transition_for_track_mut(mlt_index)
            .ok_or_else(|| invalid(format!("track {track} does not composite")))
    }

    pub fn is_track_composite(&self, track: usize) -> bool {
        self.compositing(track).is_some_and(TrackTransition::is_enabled)
    }

    pub fn set_track_composite(&mut self, track: usize, composite: bool) -> Result<()> {
        let transition = self.compositing_mut(track)?;
        if composite {
            transition.clear(DISABLE_PROPERTY);
        } else {
            transition.set(DISABLE_PROPERTY, 1);
        }
        Ok(())
    }

    pub fn blend_mode(&self, track: usize) -> Option<&str> {
        self.compositing(track)
            .and_then(|t| t.get(BLEND_MODE_PROPERTY))
    }

    /// An empty mode restores the default blend.
    pub fn set_blend_mode(&mut self, track: usize, mode: &str) -> Result<()> {
        let transition = self.compositing_mut(track)?;
        if mode.is_empty() {
            transition.clear(BLEND_MODE_PROPERTY);
        } else {
            transition.set(BLEND_MODE_PROPERTY, mode);
        }
        Ok(())
    }

    /// Announce that filters on a clip changed without touching the model.
    pub fn attached_filter_changed(&self, track: usize, clip: usize) {
        if self.producer_for_clip(track, clip).is_some() {
            self.events
                .emit(TimelineEvent::AttachedFilterChanged { track, clip });
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Interchange text of one track's playlist.
    pub fn track_text(&self, track: usize) -> Result<String> {
        self.playlist(track)
            .ok_or(CoreError::TrackNotFound(track))?
            .to_text()
    }

    pub(crate) fn snapshot_tracks(&self, tracks: &[usize]) -> Result<Vec<(usize, String)>> {
        let mut snapshot: Vec<(usize, String)> = Vec::with_capacity(tracks.len());
        for &track in tracks {
            let mlt_index = self.mlt_index(track)?;
            if snapshot.iter().any(|(i, _)| *i == mlt_index) {
                continue;
            }
            snapshot.push((mlt_index, self.track_text(track)?));
        }
        Ok(snapshot)
    }

    pub(crate) fn restore_tracks(&mut self, snapshot: &[(usize, String)]) -> Result<()> {
        for (mlt_index, text) in snapshot {
            let playlist = Playlist::from_text(text)?;
            let slot = self
                .tractor
                .track_mut(*mlt_index)
                .ok_or(CoreError::TrackNotFound(*mlt_index))?;
            *slot = playlist;
        }
        Ok(())
    }

    pub(crate) fn restore_composition(&mut self, text: &str) -> Result<()> {
        self.tractor = Tractor::from_text(text)?;
        self.rebuild_track_list();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
