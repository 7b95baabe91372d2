use crate::error::Result;
use crate::playlist::Playlist;
use crate::producer::{Properties, PropertyAccess};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const BLEND_SERVICE: &str = "frei0r.cairoblend";
/// Property of the blend transition that holds the blend mode.
pub const BLEND_MODE_PROPERTY: &str = "1";
pub const DISABLE_PROPERTY: &str = "disable";

/// A compositing transition layering `b_track` over `a_track`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackTransition {
    pub service: String,
    pub a_track: usize,
    pub b_track: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl TrackTransition {
    pub fn blend(a_track: usize, b_track: usize) -> Self {
        Self {
            service: BLEND_SERVICE.to_string(),
            a_track,
            b_track,
            properties: Properties::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.get_int(DISABLE_PROPERTY) == 0
    }
}

impl PropertyAccess for TrackTransition {
    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

/// The composition: stacked playlists plus the transitions that layer them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Tractor {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
    #[serde(default)]
    pub tracks: Vec<Playlist>,
    #[serde(default)]
    pub transitions: Vec<TrackTransition>,
}

impl Tractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track(&self, index: usize) -> Option<&Playlist> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Playlist> {
        self.tracks.get_mut(index)
    }

    pub fn get_length(&self) -> i32 {
        self.tracks
            .iter()
            .map(Playlist::get_playtime)
            .max()
            .unwrap_or(0)
    }

    pub fn append_track(&mut self, playlist: Playlist) -> usize {
        self.tracks.push(playlist);
        self.tracks.len() - 1
    }

    /// Remove a track along with the transitions that reference it, shifting
    /// the indexes of transitions above it.
    pub fn remove_track(&mut self, index: usize) -> Option<Playlist> {
        if index >= self.tracks.len() {
            return None;
        }
        let playlist = self.tracks.remove(index);
        self.transitions
            .retain(|t| t.a_track != index && t.b_track != index);
        for t in &mut self.transitions {
            if t.a_track > index {
                t.a_track -= 1;
            }
            if t.b_track > index {
                t.b_track -= 1;
            }
        }
        Some(playlist)
    }

    pub fn add_transition(&mut self, transition: TrackTransition) {
        self.transitions.push(transition);
    }

    pub fn transition_for_track(&self, b_track: usize) -> Option<&TrackTransition> {
        self.transitions.iter().find(|t| t.b_track == b_track)
    }

    pub fn transition_for_track_mut(&mut self, b_track: usize) -> Option<&mut TrackTransition> {
        self.transitions.iter_mut().find(|t| t.b_track == b_track)
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl PropertyAccess for Tractor {
    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}
